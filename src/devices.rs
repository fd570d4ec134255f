pub mod bno080;
