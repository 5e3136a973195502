//! TCP transport for RTSP signaling.
//!
//! One TCP connection carries one client's control traffic, with a thread
//! per connection. Requests are read until the `\r\n\r\n` terminator and
//! each response is written in a single call.
//!
//! Media delivery (RTP/RTCP) is not handled here — subsessions receive the
//! negotiated parameters at SETUP, including a clone of the control socket
//! when the client asked for interleaving, and transmit on their own.

pub mod tcp;
