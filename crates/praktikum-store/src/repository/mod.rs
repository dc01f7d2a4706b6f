//! # Repository Module
//!
//! SQL access for the two storage shapes of the local store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories                                         │
//! │                                                                         │
//! │  LocalStore impl for Database                                          │
//! │       │                                                                 │
//! │       ├── db.documents()  →  DocumentRepository                        │
//! │       │     ├── get(collection, id)                                    │
//! │       │     ├── list(collection)                                       │
//! │       │     ├── insert / replace / delete                              │
//! │       │     └── counts()                                               │
//! │       │                                                                 │
//! │       └── db.metadata()   →  MetadataRepository                        │
//! │             ├── get(key) / set(key, value)                             │
//! │             ├── delete(key)                                            │
//! │             └── keys_with_prefix(prefix)                               │
//! │                                                                         │
//! │  SQL is isolated here; callers only see serde_json::Value.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod document;
pub mod metadata;
