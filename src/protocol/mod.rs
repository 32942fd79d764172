// RAWLINK — PROTOCOL MODULE
// Wire format definitions and the payload containers the rings carry.

pub mod payload;
pub mod wire;
