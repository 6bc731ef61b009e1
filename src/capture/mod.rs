pub mod adb;
pub mod controller;
pub mod pattern;
pub mod pressure;
pub mod service;
pub mod source;
