pub mod cell;
pub mod errors;
pub mod layout;
