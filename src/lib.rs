pub mod net;
pub mod stress;
