pub mod utilities_module;

pub use utilities_module::UtilitiesHooks;
