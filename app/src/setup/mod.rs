mod controller;
mod events;
mod poller;
mod service;
mod state_manager;

// Public exports
pub use controller::{SetupController, SetupError};
pub use events::{Notification, NotificationKind, SetupStateChanged};
pub use poller::{start_polling, PollHandle};
pub use service::{LocalService, Prober};
pub use state_manager::{
    SetupEvent, SetupStage, SetupStateManager, TransitionRejection, TransitionResult,
};
