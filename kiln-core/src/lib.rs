//! Core library for kiln
//!
//! kiln turns a tree of source documents plus a declarative rule table
//! into output files, recompiling only the representations whose
//! inputs changed since the last run. This crate holds the document
//! model, the rule table and recorded action sequences, the
//! outdatedness decision procedure, and the compilation scheduler;
//! persisted dependency and checksum state lives in
//! `kiln-incremental`.

pub mod compiler;
pub mod config;
pub mod context;
pub mod filters;
pub mod listener;
pub mod model;
pub mod outdatedness;
pub mod registry;
pub mod rules;
pub mod source;
pub mod tracker;
pub mod view;

pub use compiler::{CompileError, CompileSummary, Compiler};
pub use config::{Config, ConfigError};
pub use context::{FilterContext, FilterError};
pub use listener::{CompilationListener, LogReporter, NullListener};
pub use model::{BinaryRef, Content, Document, Item, Layout, Rep, RepKey, Site, SiteError};
pub use outdatedness::{OutdatednessChecker, OutdatednessReason};
pub use registry::{Filter, FilterRegistry};
pub use rules::{ActionRecorder, ActionSequence, Action, LayoutRule, Rule, RuleError, RuleTable};
pub use source::{load_site, SourceError};
pub use tracker::DependencyTracker;
pub use view::{ItemView, LayoutView};
