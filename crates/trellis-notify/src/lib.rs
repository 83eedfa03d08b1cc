//! # Trellis Notify
//!
//! Side-channel notifications.
//!
//! A [`Fanout`] holds an ordered set of [`Sink`]s and implements
//! [`trellis_core::Notifier`]: every active sink receives each notification,
//! concurrently, and a failing sink is logged without affecting the others.
//!
//! Sinks are stateless with respect to a delivery: the trace id and
//! destination travel with each call in a [`Delivery`], so one sink instance
//! can serve concurrent sends.
//!
//! Shipped sinks:
//!
//! - [`SlackSink`] - incoming webhook, coloured attachment cards
//! - [`TelegramSink`] - bot API `sendMessage` with HTML text
//! - [`MemorySink`] - records deliveries in memory

#![doc(html_root_url = "https://docs.rs/trellis-notify/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod fanout;
mod memory;
mod sink;
mod slack;
mod telegram;

pub use error::NotifyError;
pub use fanout::Fanout;
pub use memory::{MemorySink, RecordedDelivery};
pub use sink::{Delivery, Sink};
pub use slack::SlackSink;
pub use telegram::TelegramSink;
