//! fOS Sciter - engine binding core
//!
//! Host-side runtime for embedding the Sciter HTML/CSS engine:
//! - Tagged [`Value`] with lossless conversion to the engine's value ABI
//! - Native closures callable from script ([`functor`])
//! - Stable-index dispatch tables behind the engine callbacks ([`dispatch`])
//! - Reference-counted element, window and request wrappers
//!
//! The engine itself sits behind [`api::SciterApi`]; [`mock::RecordingEngine`]
//! implements it in-process.

pub mod api;
pub mod archive;
pub mod dispatch;
pub mod dom;
pub mod error;
pub mod events;
pub mod functor;
pub mod handler;
pub mod mock;
pub mod notify;
pub mod options;
pub mod registry;
pub mod request;
pub mod types;
pub mod value;
pub mod window;

pub use dom::Element;
pub use error::{DomResult, Error, RequestResult, Result, ValueResult};
pub use handler::{EventHandler, EventMapper, HandlerId};
pub use notify::{CallbackHandler, LoadResult};
pub use options::{RuntimeOption, RuntimeOptions, WindowConfig};
pub use request::Request;
pub use types::{ElementHandle, Point, Rect, RequestHandle, Size, WindowFlags, WindowHandle};
pub use value::{ConvertMode, Value, ValueType};
pub use window::Window;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
