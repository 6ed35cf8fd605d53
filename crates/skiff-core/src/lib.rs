//! # skiff-core
//!
//! Client SDK for Skiff remote sandboxes.
//!
//! Templates describe an environment (code interpreter, browser, or the
//! all-in-one combination of both). Sandboxes are running instances of a
//! template. The control plane creates and destroys them; each sandbox's
//! data plane serves code contexts, files, processes, the browser and its
//! recordings.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    skiff-core (client)                   │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌─────────────────┐     ┌──────────────────────────┐   │
//! │  │     Client      │────▶│  Api (control)           │   │
//! │  │  - create()     │     │  builders → send →       │   │
//! │  │  - connect()    │     │  check status → decode   │   │
//! │  │  - templates    │     └──────────────────────────┘   │
//! │  └─────────────────┘                │                   │
//! │           │                          ▼                   │
//! │  ┌─────────────────┐     ┌──────────────────────────┐   │
//! │  │    Sandbox      │────▶│  DataApi (per sandbox)   │   │
//! │  │  - contexts()   │     │  access token, paths     │   │
//! │  │  - files()      │     └──────────────────────────┘   │
//! │  │  - browser()    │                │                   │
//! │  └─────────────────┘                ▼                   │
//! │                          ┌──────────────────────────┐   │
//! │                          │  Transport (reqwest)     │   │
//! │                          └──────────────────────────┘   │
//! │                                                          │
//! └──────────────────────────────────────────────────────────┘
//!                           │ HTTPS / WebSocket
//!                           ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │            Skiff control and data endpoints              │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use skiff_core::{Client, CodeLanguage, Config, SandboxInput, TemplateType};
//!
//! # async fn example() -> skiff_core::Result<()> {
//! let client = Client::new(Config::from_env())?;
//!
//! client
//!     .with_sandbox(TemplateType::CodeInterpreter, SandboxInput::new("my-template"), |sandbox| async move {
//!         sandbox
//!             .with_context(CodeLanguage::Python, |ctx| async move {
//!                 ctx.execute("x = 10", None).await?;
//!                 let result = ctx.execute("print(x)", None).await?;
//!                 println!("Output: {}", result.stdout());
//!                 Ok::<_, skiff_core::Error>(())
//!             })
//!             .await
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Templates**: Create, update, page through and delete templates
//! - **Sandbox Lifecycle**: Create, connect, stop, delete and health-check sandboxes
//! - **Code Contexts**: Stateful Python and JavaScript execution
//! - **Files and Processes**: Read, write, transfer files and run commands
//! - **Browser**: CDP/VNC endpoints, automation sessions and recordings
//! - **Scoped Guards**: Resources released on every exit path
//! - **Blocking API**: The same operations without an async runtime, see [`blocking`]

mod api;
pub mod blocking;
mod capability;
mod cdp;
mod client;
mod config;
mod error;
mod facade;
mod guard;
pub mod model;
mod pagination;
mod sandbox;
pub mod transport;

pub use api::DEADLINE_GRACE;
pub use capability::{Capability, CapabilitySet};
pub use cdp::BrowserSession;
pub use client::Client;
pub use config::{mask_secret, Config, ConfigBuilder, Credentials, DEFAULT_REGION, DEFAULT_TIMEOUT};
pub use error::{Error, ErrorKind, ResourceKind, Result};
pub use facade::{
    Browser, Context, Contexts, ExecuteOptions, FileSystem, Files, Processes, Recordings,
    WriteOptions, DEFAULT_CONTEXT_CWD, DEFAULT_DIR_MODE,
};
pub use guard::{Guard, Releasable};
pub use model::*;
pub use pagination::TemplatePages;
pub use sandbox::Sandbox;
