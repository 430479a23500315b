pub mod notification;
pub mod parcel;
pub mod path;
pub mod vehicle;
