//! Notes
//!
//! Owner-local records of spendable commitments and the outward-facing
//! variants produced at build time: shield notes (deposits), send notes
//! (private transfers), and unshield notes (withdrawals to a public
//! address).

pub mod note;
pub mod output;
pub mod shield;

pub use note::{Note, NoteError, NoteOrigin};
pub use output::{OutputNote, UnshieldNote};
pub use shield::{ShieldNote, SHIELD_KEY_DERIVATION_MESSAGE};
