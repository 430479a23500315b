pub mod marker;
pub mod spring;
