//! Vive tracker stream protocol.
//! Frame codec and length-prefixed transport shared by the sender and the receiver; no sockets
//! of its own, callers hand in any async byte stream.

pub mod protocol;
pub mod shutdown;
pub mod transport;
pub mod wire;

pub use protocol::{Frame, TrackerPose, IDENTITY_ORIENTATION};
pub use shutdown::{os_signal, run_until_signal, Shutdown, ShutdownSignal};
pub use transport::{read_frame, read_frame_timeout, write_frame, TransportError};
pub use wire::{decode_payload, encode_payload, MalformedMessage, DEFAULT_MAX_FRAME_LEN};
