// This is free and unencumbered software released into the public domain.

mod config;
pub use config::*;

mod dispatch;
pub use dispatch::*;

pub mod drivers {
    #[cfg(feature = "ffmpeg")]
    pub mod ffmpeg;

    pub mod synthetic;
}

mod error;
pub use error::*;

mod facing;
pub use facing::*;

mod frame;
pub use frame::*;

mod holder;
pub use holder::*;

pub mod negotiate;
pub use negotiate::select;

mod open;
pub use open::*;

mod platform;
pub use platform::*;

mod registry;
pub use registry::*;

mod resource;
pub use resource::*;

mod size;
pub use size::*;
