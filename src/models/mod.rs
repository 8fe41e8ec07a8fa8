pub mod appointment;
pub mod consultation;
pub mod conversation;
pub mod enums;
pub mod filters;
pub mod medical_file;
pub mod notification;
pub mod prescription;
pub mod user;

pub use appointment::*;
pub use consultation::*;
pub use conversation::*;
pub use filters::*;
pub use medical_file::*;
pub use notification::*;
pub use prescription::*;
pub use user::*;
