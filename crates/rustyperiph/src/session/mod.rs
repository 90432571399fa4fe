//! Peripheral session layer
//!
//! Ties the advertising registry, the key store and the security tracker
//! together behind a single event dispatcher. Lower layers report through
//! [`SessionObserver`]; the dispatcher turns each report into [`Outcome`]s.

mod config;
mod controller;
mod dispatcher;
mod event;
mod timer;


pub use self::config::{SessionConfig, DEFAULT_SETTLE_DELAY};
pub use self::controller::{
    Binding, BindingState, Connection, ConnectionController, ConnectionState,
};
pub use self::dispatcher::{Dispatcher, EventSender, Session, SessionObserver};
pub use self::event::{Outcome, SessionEvent, UserCommandKind};
pub use self::timer::{TimerId, TimerQueue};
