pub mod frame;
pub mod legend;
pub mod messages;
pub mod signal_state;
pub mod stream_buffer;
pub mod time_window;
pub mod types;

pub use frame::*;
pub use legend::*;
pub use messages::*;
pub use signal_state::*;
pub use stream_buffer::*;
pub use time_window::*;
pub use types::*;
