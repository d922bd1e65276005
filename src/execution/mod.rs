// Position lifecycle, trading cycle and check scheduling
pub mod cycle;
pub mod position_manager;
pub mod schedule;

pub use cycle::{CycleError, CycleOutcome, Market, TradingCycle};
pub use position_manager::{
    EntryError, ExitPolicy, PositionManager, ReconcileError, ReconcileOutcome, StartupCheck,
};
pub use schedule::{next_check_time, CheckSchedule};
