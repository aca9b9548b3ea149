//! # Audio Module
//!
//! Per-guild playback engine for DisBot.
//!
//! ## Architecture
//!
//! ### [`session`] - Guild Session
//! - One task per guild owns the queue, volume, voice connection and idle timer
//! - Commands arrive through a cloneable [`session::SessionHandle`]
//! - Stream events are tagged with a generation so stale ones are dropped
//!
//! ### [`queue`] - Queue Management
//! - Ordered items, head is what is playing
//! - Loop policies (single, multiple, shuffle) and autoplay flag
//!
//! ### [`player`] - Item Players
//! - [`player::ItemPlayer`] trait and the closure-backed [`player::QueueItemPlayer`]
//! - [`player::plan_advance`] decides what happens when the head finishes
//!
//! ### [`connection`] - Voice Platform Seam
//! - Traits over the voice platform, implemented for songbird in [`songbird_driver`]
//! - [`connection::ConnectionSupervisor`] reuses or recreates connections
//!
//! ### [`volume`] - Volume
//! - Guild multiplier and maximum from the config store, mute with restore
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use disbot::audio::{registry::GuildRegistry, session::SessionDeps};
//! use serenity::all::{ChannelId, GuildId};
//!
//! # async fn example(deps: SessionDeps, item: disbot::audio::queue::QueueItem) -> anyhow::Result<()> {
//! let registry = GuildRegistry::new(deps);
//! let session = registry.session(GuildId::new(123456789));
//!
//! session.connect(ChannelId::new(42), false).await?;
//! session.enqueue(item, None).await?;
//!
//! let controller = registry.controller(GuildId::new(123456789));
//! controller.pause().await?;
//! controller.resume().await?;
//! controller.skip().await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod controller;
pub mod error;
pub mod player;
pub mod queue;
pub mod registry;
pub mod session;
pub mod songbird_driver;
pub mod volume;

#[cfg(test)]
pub mod testing;
