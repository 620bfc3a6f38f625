/*!
# Eventshare

A social event board backend, built in Rust.

## Overview

Users keep a personal board of events sorted into three columns (ideas,
upcoming, past). They follow other users, see their events in a feed, and can
like, share or copy them onto their own board. Descriptions may mention other
users with `@username`.

## Architecture

### HTTP Layer
- **Technologies**: axum, tower-http
- Cookie sessions resolved by the `require_auth` middleware
- JSON request and response bodies, errors as `{"error": "..."}`
- Optional static frontend bundle served from `STATIC_DIR`

### Domain Layer
- **Visibility** - who may see an event or a whole board
- **Events** - board ordering, optimistic versioning, roll-over of elapsed events
- **Social** - likes, shares into an inbox, copies tracked back to their root
- **Mentions** - `@username` extraction from descriptions

### Data Persistence Layer
- SQLite through sqlx, schema created at start-up
- Foreign keys enforced; deleting an event removes its likes, shares and mentions

## Modules

- **app**: Shared state, routing and server start-up
- **config**: Environment configuration
- **db**: Connection pool and schema
- **error**: `AppError` and its HTTP mapping
- **login**: Registration, sessions and password management
- **mailer**: Password reset email
- **mentions**: `@username` parsing
- **models**: SQL access per table
- **users**: Profiles, search and the follow graph
- **events**: Board, feed, likes, shares and copies
- **extract**: Request extractors that reject with `AppError`
- **visibility**: Access rules for events and boards

## REST API Endpoints

- `/api/auth/{register,login,logout,forgot-password,reset-password}` - Account access
- `/api/me`, `/api/me/password` - The caller's own profile
- `/api/users?q=`, `/api/users/:username` - Search and profiles
- `/api/users/:username/{follow,followers,following,events}` - Follow graph and boards
- `/api/events`, `/api/events/order`, `/api/events/:id` - The caller's board
- `/api/events/:id/{like,share,copy}` - Social actions
- `/api/feed`, `/api/inbox`, `/api/mentions` - What others did
*/

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod extract;
pub mod login;
pub mod mailer;
pub mod mentions;
pub mod models;
pub mod users;
pub mod visibility;

pub use app::{AppState, router, run};
pub use config::Config;
pub use error::{AppError, AppResult};
