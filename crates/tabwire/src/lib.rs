// tabwire: session multiplexing and frame lifecycle core for
// DevTools-style browser automation.
//
// One duplex transport, many concurrent logical sessions (tab, worker,
// OOP iframe), a frame tree per page reconciled from an out-of-order
// event stream, and execution-context bindings that always point at the
// live JavaScript realm. Input synthesis, rendering, and process launch
// live in higher layers.

pub mod callbacks;
pub mod connection;
pub mod deferred;
pub mod device_prompt;
pub mod error;
pub mod events;
pub mod frame;
pub mod frame_manager;
pub mod frame_tree;
pub mod message;
pub mod network;
pub mod page;
pub mod session;
pub mod target;
pub mod target_manager;
pub mod transport;
pub mod world;

pub use callbacks::CallbackRegistry;
pub use connection::{Connection, ConnectionEvent, DEFAULT_PROTOCOL_TIMEOUT};
pub use error::{Error, Result};
pub use frame::{Frame, FrameEvent};
pub use frame_manager::{FrameManager, FrameManagerEvent};
pub use frame_tree::FrameTree;
pub use message::{
    CdpEvent, Command, DetachReason, FramePayload, FrameTreeSnapshot, Message, NavigationType,
    TargetInfo,
};
pub use page::Page;
pub use session::{Session, SessionEvent};
pub use target::{InitializationStatus, Target, TargetType};
pub use target_manager::{TargetEvent, TargetFilter, TargetManager};
pub use transport::{PipeTransport, PipeTransportReceiver, Transport};
pub use world::{IsolatedWorld, WorldKind, UTILITY_WORLD_NAME};
