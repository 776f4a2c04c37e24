// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search requests, responses and hydration.

pub mod hydrate;
pub mod request;
pub mod response;

pub use hydrate::{hydrate, order_by_hits, Attachments, HydratedHit};
pub use request::{build_search_body, EsResultMode, SearchOptions, SortSpec};
pub use response::{Hit, HitsEnvelope, SearchResponse, SearchResults, TotalHits};
