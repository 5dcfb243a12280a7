pub mod cycle;
pub mod session;

pub use cycle::CyclePhase;
pub use session::SessionPhase;
