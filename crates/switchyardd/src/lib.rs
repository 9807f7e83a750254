//! switchyardd library half: daemon pieces that integration tests drive
//! directly.

pub mod converger;
