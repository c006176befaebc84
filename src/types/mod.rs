pub mod channel;
pub mod station;
pub mod weather_field;
