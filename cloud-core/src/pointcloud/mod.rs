pub mod cloud;
pub mod sensor;
pub mod store;
pub mod visibility;
