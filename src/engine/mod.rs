//! Execution engine module
//!
//! Main read loop and stream orchestration.
//!
//! # Overview
//!
//! `SyncEngine` walks every list in ascending id order and, within each
//! list, every traversed entity in `ENTITY_ORDER`. After an entity finishes
//! for a list the checkpoint `(list, entity)` is persisted, so a failed run
//! resumes at the next entity. Per-scope bookmarks are advanced once a scope
//! has been read to the end; activity bookmarks are set when the whole run
//! completes.
//!
//! Everything is sequential: one request is in flight at a time.

mod resume;
mod types;

pub use resume::{compare_parent_ids, resume_point, ResumePoint};
pub use types::{SyncConfig, SyncPhase, SyncStats};

use crate::enrich::enrich;
use crate::error::{Error, Result};
use crate::output::{Message, RecordSink};
use crate::pagination::{paginate, PageCursor, PaginationStyle};
use crate::selection::Selection;
use crate::state::{parse_timestamp, BookmarkKey, Checkpoint, StateManager, Watermark};
use crate::streams::{
    self, DetailFetch, EntityDef, Incremental, ENTITY_ORDER, LISTS, SEND_DATE_FIELD,
    START_DATE_PARAM,
};
use crate::template;
use crate::transport::{PageRequest, Transport};
use crate::types::{scalar_to_string, JsonObject, OptionStringExt, Record};
use chrono::{DateTime, TimeDelta, Utc};
use futures::TryStreamExt;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Keys inherited from the ancestors of a record
#[derive(Debug, Clone, Default)]
struct Scope {
    /// Enrichment keys, also used to render paths
    keys: JsonObject,
    /// Key values in ancestor order
    ids: Vec<String>,
    /// Send date of the nearest message ancestor
    send_date: Option<String>,
}

impl Scope {
    /// Id contributed by the nearest ancestor
    fn id(&self) -> Option<&str> {
        self.ids.last().map(String::as_str)
    }
}

/// A fetched record with the scope it was fetched under
#[derive(Debug, Clone)]
struct Scoped {
    scope: Scope,
    record: Record,
}

impl Scoped {
    /// Scope for the children of this record
    fn child_scope(&self, entity: &EntityDef) -> Option<Scope> {
        let child_key = entity.child_key?;
        let value = self.record.get(child_key.field).filter(|v| !v.is_null())?;
        let id = scalar_to_string(value)?;

        let mut scope = self.scope.clone();
        scope.keys.insert(child_key.alias.to_string(), value.clone());
        scope.ids.push(id);
        scope.send_date = self
            .record
            .get(SEND_DATE_FIELD)
            .and_then(scalar_to_string)
            .none_if_empty();
        Some(scope)
    }
}

/// One pass over an entity within a scope
struct ScopeRequest<'a> {
    entity: &'static EntityDef,
    scope: &'a Scope,
    params: Vec<(String, String)>,
    /// Record field tracked as the watermark
    watermark_field: Option<&'static str>,
}

#[derive(Default)]
struct ScopeResult {
    records: Vec<Scoped>,
    max_watermark: Option<Watermark>,
    /// At least one page was read; the scope is known to exist
    fetched: bool,
}

/// Records kept per entity while a parent is processed
type ParentCache = HashMap<&'static str, Vec<Scoped>>;

fn entity(name: &str) -> Result<&'static EntityDef> {
    streams::get(name).ok_or_else(|| Error::StreamNotFound {
        stream: name.to_string(),
    })
}

/// Sync engine for orchestrating data extraction
pub struct SyncEngine<T> {
    /// Page source
    transport: T,
    /// State manager
    state: StateManager,
    /// Sync configuration
    config: SyncConfig,
    /// Statistics
    stats: SyncStats,
    /// Current position
    phase: SyncPhase,
}

impl<T: Transport> SyncEngine<T> {
    /// Create a new sync engine
    pub fn new(transport: T, state: StateManager, config: SyncConfig) -> Self {
        Self {
            transport,
            state,
            config,
            stats: SyncStats::default(),
            phase: SyncPhase::default(),
        }
    }

    /// Get the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get the state manager
    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Consume the engine, returning its state
    pub fn into_state(self) -> StateManager {
        self.state
    }

    /// Get statistics
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Current position
    pub fn phase(&self) -> &SyncPhase {
        &self.phase
    }

    /// Run a full sync of the selected streams
    ///
    /// On error the run stops where it is; the last persisted checkpoint
    /// and bookmarks stay in place for the next run.
    pub async fn run(&mut self, selection: &Selection, sink: &mut dyn RecordSink) -> Result<SyncStats> {
        let started = Instant::now();
        self.stats = SyncStats::new();
        self.phase = SyncPhase::NotStarted;

        if selection.is_empty() {
            info!("No streams selected, nothing to sync");
            self.phase = SyncPhase::Done;
            return Ok(self.stats.clone());
        }

        let parents = self.fetch_lists(selection, sink).await?;

        if ENTITY_ORDER.iter().any(|name| selection.traverses(name)) {
            let ids: Vec<String> = parents.iter().map(|(id, _)| id.clone()).collect();
            let resume = resume_point(self.state.checkpoint(), &ids, |name| {
                selection.traverses(name)
            });

            for (index, (id, list)) in parents.iter().enumerate().skip(resume.parent_index) {
                self.sync_parent(index, id, list, resume, selection, sink)
                    .await?;
            }
        }

        self.finish(selection, sink).await?;

        self.stats
            .set_duration(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
        info!(
            records = self.stats.records_emitted,
            pages = self.stats.pages_fetched,
            parents = self.stats.parents_synced,
            streams = self.stats.streams.len(),
            duration_ms = self.stats.duration_ms,
            "Sync complete"
        );
        Ok(self.stats.clone())
    }

    /// Fetch (and maybe emit) lists, returning them in processing order
    async fn fetch_lists(
        &mut self,
        selection: &Selection,
        sink: &mut dyn RecordSink,
    ) -> Result<Vec<(String, Scoped)>> {
        let lists = entity(LISTS)?;
        let emit = selection.emits(LISTS);
        if emit {
            self.emit_schema(lists, sink)?;
        }

        let root = Scope::default();
        let result = self
            .fetch_scope(
                ScopeRequest {
                    entity: lists,
                    scope: &root,
                    params: Vec::new(),
                    watermark_field: None,
                },
                emit,
                true,
                sink,
            )
            .await?;

        let mut parents: Vec<(String, Scoped)> = Vec::with_capacity(result.records.len());
        for list in result.records {
            match list.child_scope(lists).as_ref().and_then(Scope::id) {
                Some(id) => parents.push((id.to_string(), list)),
                None => warn!(record = %list.record, "List without listId, skipping"),
            }
        }
        parents.sort_by(|(a, _), (b, _)| compare_parent_ids(a, b));
        parents.dedup_by(|(a, _), (b, _)| a == b);

        info!(lists = parents.len(), "Fetched lists");
        Ok(parents)
    }

    /// Process every traversed entity of one list
    async fn sync_parent(
        &mut self,
        index: usize,
        id: &str,
        list: &Scoped,
        resume: ResumePoint,
        selection: &Selection,
        sink: &mut dyn RecordSink,
    ) -> Result<()> {
        info!(list_id = id, "Syncing list");
        self.phase = SyncPhase::InParent(id.to_string());

        let resuming_inside = index == resume.parent_index && resume.completed_through.is_some();
        if !resuming_inside {
            self.write_checkpoint(Checkpoint::in_parent(id), sink)
                .await?;
        }

        let mut cache = ParentCache::new();
        cache.insert(LISTS, vec![list.clone()]);

        for (order, name) in ENTITY_ORDER.iter().enumerate() {
            if !selection.traverses(name) || resume.skips(index, order) {
                continue;
            }

            let def = entity(name)?;
            self.phase = SyncPhase::InEntity(id.to_string(), (*name).to_string());
            self.ensure_ancestors(def, &mut cache, sink).await?;

            let keep = streams::all()
                .iter()
                .any(|child| child.parent == Some(def.name) && selection.traverses(child.name));
            let emitted_before = self.stats.records_emitted;

            self.sync_entity(def, &mut cache, selection.emits(name), keep, sink)
                .await?;

            debug!(
                list_id = id,
                stream = *name,
                records = self.stats.records_emitted - emitted_before,
                "Entity complete"
            );
            self.write_checkpoint(Checkpoint::completed(id, *name), sink)
                .await?;
        }

        self.stats.parents_synced += 1;
        Ok(())
    }

    /// Refetch ancestors that a resumed run skipped
    ///
    /// Their records are needed as scopes but are not emitted again.
    async fn ensure_ancestors(
        &mut self,
        def: &'static EntityDef,
        cache: &mut ParentCache,
        sink: &mut dyn RecordSink,
    ) -> Result<()> {
        let mut missing = Vec::new();
        let mut current = def.parent;
        while let Some(name) = current {
            if cache.contains_key(name) {
                break;
            }
            let ancestor = entity(name)?;
            missing.push(ancestor);
            current = ancestor.parent;
        }

        for ancestor in missing.into_iter().rev() {
            debug!(stream = ancestor.name, "Refetching ancestor for resumed run");
            self.sync_entity(ancestor, cache, false, true, sink).await?;
        }
        Ok(())
    }

    /// Fetch one entity across all scopes of its parent's records
    async fn sync_entity(
        &mut self,
        def: &'static EntityDef,
        cache: &mut ParentCache,
        emit: bool,
        keep: bool,
        sink: &mut dyn RecordSink,
    ) -> Result<()> {
        let parent = entity(def.parent.unwrap_or(LISTS))?;
        let scopes: Vec<Scope> = cache
            .get(parent.name)
            .map(|records| {
                records
                    .iter()
                    .filter_map(|record| {
                        let scope = record.child_scope(parent);
                        if scope.is_none() {
                            warn!(
                                stream = def.name,
                                parent = parent.name,
                                "Parent record without id, skipping"
                            );
                        }
                        scope
                    })
                    .collect()
            })
            .unwrap_or_default();

        if emit {
            self.emit_schema(def, sink)?;
        }

        let cutoff = self.activity_cutoff(def);
        let mut kept = Vec::new();

        for scope in &scopes {
            if matches!(def.incremental, Incremental::Activity { .. }) && !in_window(scope, cutoff) {
                debug!(
                    stream = def.name,
                    parent = scope.id().unwrap_or_default(),
                    send_date = scope.send_date.as_deref().unwrap_or_default(),
                    "Outside activity window, skipping"
                );
                self.stats.activity_skipped += 1;
                continue;
            }

            for (request, bookmark) in self.scope_passes(def, scope) {
                let result = self.fetch_scope(request, emit, keep, sink).await?;

                if let (Some(key), true, true) = (bookmark, result.fetched, emit) {
                    // An empty scope still records where its next request starts
                    let watermark = result
                        .max_watermark
                        .unwrap_or_else(|| self.state.bookmark(&key, &self.config.start_date));
                    sink.flush()?;
                    if self.state.set_bookmark(&key, watermark.clone()).await? {
                        debug!(bookmark = %key, watermark = %watermark, "Bookmark advanced");
                    }
                }
                kept.extend(result.records);
            }
        }

        if keep {
            cache.insert(def.name, kept);
        }
        Ok(())
    }

    /// Requests to make for one scope, each with the bookmark it advances
    fn scope_passes<'a>(
        &self,
        def: &'static EntityDef,
        scope: &'a Scope,
    ) -> Vec<(ScopeRequest<'a>, Option<BookmarkKey>)> {
        match def.incremental {
            Incremental::Full => vec![(
                ScopeRequest {
                    entity: def,
                    scope,
                    params: Vec::new(),
                    watermark_field: None,
                },
                None,
            )],
            Incremental::Watermark { variants } => variants
                .iter()
                .map(|variant| {
                    let key = BookmarkKey::scoped(
                        def.name,
                        scope.ids.iter().map(String::as_str).chain([variant.name]),
                    );
                    let start = self.state.bookmark(&key, &self.config.start_date);
                    let params = vec![
                        (variant.param.0.to_string(), variant.param.1.to_string()),
                        (START_DATE_PARAM.to_string(), start.to_string()),
                    ];
                    (
                        ScopeRequest {
                            entity: def,
                            scope,
                            params,
                            watermark_field: Some(variant.watermark_field),
                        },
                        Some(key),
                    )
                })
                .collect(),
            Incremental::Activity { params } => {
                let mut params: Vec<(String, String)> = params
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect();
                if let Some(sent) = &scope.send_date {
                    params.push((START_DATE_PARAM.to_string(), sent.clone()));
                }
                vec![(
                    ScopeRequest {
                        entity: def,
                        scope,
                        params,
                        watermark_field: None,
                    },
                    None,
                )]
            }
        }
    }

    /// Earliest send date whose activity is still fetched
    fn activity_cutoff(&self, def: &EntityDef) -> Option<DateTime<Utc>> {
        if !matches!(def.incremental, Incremental::Activity { .. }) {
            return None;
        }
        let bookmark = self
            .state
            .bookmark(&BookmarkKey::global(def.name), &self.config.start_date);
        let window = TimeDelta::try_days(self.config.num_activity_days)?;
        bookmark.timestamp()?.checked_sub_signed(window)
    }

    /// Read every page of one request, enriching and emitting records
    async fn fetch_scope(
        &mut self,
        request: ScopeRequest<'_>,
        emit: bool,
        keep: bool,
        sink: &mut dyn RecordSink,
    ) -> Result<ScopeResult> {
        let def = request.entity;
        let style = if def.paged {
            PaginationStyle::cursor(self.config.page_size)
        } else {
            PaginationStyle::None
        };
        let mut page_request =
            PageRequest::new(def.name, template::render(def.path, &request.scope.keys)?)
                .style(style);
        page_request.params = request.params;

        let transport = &self.transport;
        let page_request = &page_request;
        let mut pages = std::pin::pin!(paginate(move |cursor: PageCursor| async move {
            transport.fetch_page(page_request, &cursor).await
        }));

        let mut result = ScopeResult::default();
        loop {
            let page = match pages.try_next().await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                // Only a missing first page means the scope is empty. Later
                // pages going away leaves the scope half read, so the run
                // stops before its bookmark can move.
                Err(e) if e.is_not_found() && !result.fetched => {
                    debug!(
                        stream = def.name,
                        path = %page_request.path,
                        "Not found, treating scope as empty"
                    );
                    self.stats.scopes_not_found += 1;
                    break;
                }
                Err(e) => return Err(e),
            };
            result.fetched = true;
            self.stats.add_page(page.len());

            for listed in page.records {
                let record = match def.detail {
                    Some(detail) => {
                        match fetch_detail(transport, def, detail, request.scope, listed).await? {
                            Some(full) => {
                                self.stats.pages_fetched += 1;
                                full
                            }
                            None => continue,
                        }
                    }
                    None => listed,
                };
                let record = enrich(record, &request.scope.keys);

                if let Some(field) = request.watermark_field {
                    let observed = record
                        .get(field)
                        .and_then(scalar_to_string)
                        .none_if_empty()
                        .map(Watermark::new);
                    if let Some(observed) = observed {
                        if result.max_watermark.as_ref().map_or(true, |max| observed > *max) {
                            result.max_watermark = Some(observed);
                        }
                    }
                }

                if emit {
                    sink.write(&Message::record(def.name, record.clone()))?;
                    self.stats.add_emitted();
                }
                if keep {
                    result.records.push(Scoped {
                        scope: request.scope.clone(),
                        record,
                    });
                }
            }
        }

        Ok(result)
    }

    /// End of run: activity bookmarks, clear checkpoint, final STATE
    async fn finish(&mut self, selection: &Selection, sink: &mut dyn RecordSink) -> Result<()> {
        sink.flush()?;

        let now = Watermark::now();
        for def in streams::all() {
            if matches!(def.incremental, Incremental::Activity { .. }) && selection.emits(def.name) {
                self.state
                    .set_bookmark(&BookmarkKey::global(def.name), now.clone())
                    .await?;
            }
        }

        self.state.clear_checkpoint().await?;
        self.state.save().await?;
        self.emit_state(sink)?;
        sink.flush()?;

        self.phase = SyncPhase::Done;
        Ok(())
    }

    /// Persist a checkpoint after everything before it has been flushed
    async fn write_checkpoint(
        &mut self,
        checkpoint: Checkpoint,
        sink: &mut dyn RecordSink,
    ) -> Result<()> {
        sink.flush()?;
        self.state.write_checkpoint(checkpoint).await?;
        self.emit_state(sink)
    }

    fn emit_state(&self, sink: &mut dyn RecordSink) -> Result<()> {
        sink.write(&Message::state(self.state.to_value()?))
    }

    fn emit_schema(&mut self, def: &EntityDef, sink: &mut dyn RecordSink) -> Result<()> {
        if self.stats.streams.contains(def.name) {
            return Ok(());
        }
        sink.write(&Message::schema(
            def.name,
            streams::schema(def),
            def.key_properties.iter().map(|k| (*k).to_string()).collect(),
        ))?;
        self.stats.add_stream(def.name);
        Ok(())
    }
}

/// Whether a parent message is recent enough for its activity to be fetched
fn in_window(scope: &Scope, cutoff: Option<DateTime<Utc>>) -> bool {
    let Some(sent) = scope.send_date.as_deref().and_then(parse_timestamp) else {
        return false;
    };
    cutoff.map_or(true, |cutoff| sent >= cutoff)
}

/// Fetch the full record behind a listed id
///
/// A listed record without an id, or one whose detail is gone, is skipped.
async fn fetch_detail<T: Transport + ?Sized>(
    transport: &T,
    def: &EntityDef,
    detail: DetailFetch,
    scope: &Scope,
    listed: Record,
) -> Result<Option<Record>> {
    let Some(id) = listed.get(detail.id_field).filter(|v| !v.is_null()) else {
        warn!(stream = def.name, field = detail.id_field, "Listed record without id, skipping");
        return Ok(None);
    };

    let mut vars = scope.keys.clone();
    vars.insert(detail.id_field.to_string(), id.clone());
    let request = PageRequest::new(def.name, template::render(detail.path, &vars)?);

    match transport.fetch_page(&request, &PageCursor::Start).await {
        Ok(page) => Ok(Some(page.records.into_iter().next().unwrap_or(listed))),
        Err(e) if e.is_not_found() => {
            warn!(stream = def.name, path = %request.path, "Detail not found, skipping");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
