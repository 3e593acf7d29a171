/* Copyright (C) 2024  Momentum Mod Team
 *
 * This library is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This library is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this repository.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Rank aggregation for Momentum Mod.
//!
//! Every pass loads all runs on ranked main-track leaderboards, turns placements into XP, ranks
//! players per gamemode and publishes the result into Redis as an atomically swapped snapshot.

#[macro_use]
extern crate derive_more;

#[allow(unused_imports)]
#[macro_use(trace, debug, debug_span, info, info_span, warn, error)]
extern crate tracing;

#[macro_use(select)]
extern crate tokio;

#[macro_use]
mod macros;

pub mod config;
pub use config::Config;

pub mod context;
pub use context::Context;

pub mod database;

pub mod gamemode;
pub use gamemode::{Gamemode, ModeMap};

pub mod users;
pub mod time;
pub mod leaderboards;
pub mod cache;
pub mod ranks;
