//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module       | Commands handled            |
//! |--------------|-----------------------------|
//! | `auth`       | `Login`, `Logout`, `Whoami` |
//! | `workspaces` | `Workspaces`                |
//! | `chat`       | `Chat`                      |

pub mod auth;
pub mod chat;
pub mod workspaces;

pub use auth::{cmd_login, cmd_logout, cmd_whoami};
pub use chat::cmd_chat;
pub use workspaces::cmd_workspaces;
