pub mod address;
pub mod codec;
pub mod events;
pub mod gatt;
pub mod models;
pub mod settings;
