pub mod registry;
pub mod sorted_oracles;

pub use registry::IRegistry;
pub use sorted_oracles::ISortedOracles;
