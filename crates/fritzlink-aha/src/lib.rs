// fritzlink-aha: Async Rust client for the AVM Home Automation HTTP interface

pub mod client;
pub mod devicelist;
pub mod digest;
pub mod error;
pub mod guest;
pub mod session;
pub mod transport;
pub mod units;

mod homeauto;

pub use client::{AhaClient, AhaCommand, DispatchMode};
pub use error::Error;
pub use guest::GuestWlanStatus;
pub use session::{Credentials, INVALID_SID, Session, SessionId};
pub use transport::{TlsMode, TransportConfig};
pub use units::HkrTarget;
