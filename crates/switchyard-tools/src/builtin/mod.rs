pub mod declared;
pub mod function;
