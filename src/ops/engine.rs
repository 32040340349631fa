//! The query service
//!
//! `QueryEngine` owns the catalog, the plan cache, the client cursor table
//! and the running-operation registry, and is the single entry point for
//! client operations. Collection and index changes keep the plan cache and
//! open cursors consistent with the data.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::cursor::{ClientCursorTable, CursorConfig, CursorError, CursorId, CursorMonitor, CursorStats};
use crate::executor::{
    new_query_cursor, CursorContext, ExecutorConfig, Interrupt, Matcher, PredicateMatcher,
};
use crate::index::{IndexKey, KeyPattern};
use crate::observability::{Event, Logger, MetricsRegistry, MetricsSnapshot, ObservationScope, Timer};
use crate::planner::{PlanCache, PlanSelectionPolicy, QueryExplain, QueryExpr};
use crate::storage::{read_collection, write_collection, Catalog, CollectionHandle, StorageError};

use super::batch::BatchLimits;
use super::current_op::{CurrentOp, CurrentOpRegistry, OpKind};
use super::errors::{OpsError, OpsResult};
use super::parsed::ParsedQuery;
use super::principal::Principal;
use super::query::{self, QueryResponse};
use super::strategy::{Remainder, ResponseBuildStrategy, ResultShape};

pub struct QueryEngine {
    catalog: Arc<Catalog>,
    cache: Arc<PlanCache>,
    cursors: Arc<ClientCursorTable>,
    ops: CurrentOpRegistry,
    metrics: Arc<MetricsRegistry>,
    config: ExecutorConfig,
    policy: PlanSelectionPolicy,
}

impl QueryEngine {
    pub fn new(config: ExecutorConfig, cursor_config: CursorConfig) -> Self {
        let catalog = Arc::new(Catalog::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let cursors = ClientCursorTable::new(cursor_config)
            .with_catalog(Arc::clone(&catalog))
            .with_metrics(Arc::clone(&metrics));
        Self {
            cache: Arc::new(PlanCache::new(config.plan_cache_write_threshold)),
            catalog,
            cursors: Arc::new(cursors),
            ops: CurrentOpRegistry::new(),
            metrics,
            config,
            policy: PlanSelectionPolicy::Any,
        }
    }

    /// Restricts the plans every query may run
    pub fn with_policy(mut self, policy: PlanSelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn cursors(&self) -> &Arc<ClientCursorTable> {
        &self.cursors
    }

    pub fn plan_cache(&self) -> &Arc<PlanCache> {
        &self.cache
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Starts the idle-cursor sweep for this engine's table
    pub fn start_monitor(&self) -> std::io::Result<CursorMonitor> {
        CursorMonitor::start(Arc::clone(&self.cursors))
    }

    fn context(&self, handle: CollectionHandle, ns: &str, interrupt: Interrupt) -> CursorContext {
        CursorContext::new(handle, ns, self.config.clone())
            .with_cache(Arc::clone(&self.cache))
            .with_policy(self.policy)
            .with_interrupt(interrupt)
            .with_metrics(Arc::clone(&self.metrics))
    }

    fn authorize(principal: &Principal, ns: &str) -> OpsResult<()> {
        if principal.is_authorized(ns) {
            Ok(())
        } else {
            Err(CursorError::Unauthorized(ns.to_string()).into())
        }
    }

    fn note_failure(&self, err: &OpsError, ns: &str) {
        if err.is_interrupted() {
            self.metrics.increment_interrupts();
            Logger::warn(
                Event::OperationInterrupted.as_str(),
                &[("ns", ns), ("code", err.code())],
            );
        }
        if err.is_rejection() {
            self.metrics.increment_queries_rejected();
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Parses and runs a find request
    pub fn find(&self, request: &Value, principal: &Principal) -> OpsResult<QueryResponse> {
        let parsed = match ParsedQuery::parse(request) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.metrics.increment_queries_rejected();
                return Err(err);
            }
        };
        self.find_parsed(&parsed, principal)
    }

    pub fn find_parsed(&self, parsed: &ParsedQuery, principal: &Principal) -> OpsResult<QueryResponse> {
        let scope = ObservationScope::with_fields("QUERY", &[("ns", parsed.ns.as_str())]);
        let result = Self::authorize(principal, &parsed.ns).and_then(|()| self.run_find(parsed));
        match result {
            Ok(response) => {
                self.metrics.increment_queries_executed();
                if response.cursor_id != 0 {
                    self.metrics.increment_cursors_opened();
                }
                scope.complete_with_fields(&[
                    ("n", response.n_returned().to_string().as_str()),
                    ("cursor_id", response.cursor_id.to_string().as_str()),
                ]);
                Ok(response)
            }
            Err(err) => {
                self.note_failure(&err, &parsed.ns);
                scope.fail(err.code(), &err.to_string(), err.is_rejection());
                Err(err)
            }
        }
    }

    fn run_find(&self, parsed: &ParsedQuery) -> OpsResult<QueryResponse> {
        // A missing collection has no documents and no plans to race
        let Some(handle) = self.catalog.get(&parsed.ns) else {
            return Ok(QueryResponse::empty(&parsed.ns));
        };
        let interrupt = Interrupt::new();
        let ctx = self.context(handle, &parsed.ns, interrupt.clone());
        let _op = self.ops.register(OpKind::Query, &parsed.ns, interrupt);
        query::run_query(&ctx, parsed, &self.cursors)
    }

    pub fn get_more(
        &self,
        ns: &str,
        id: CursorId,
        batch_size: usize,
        principal: &Principal,
    ) -> OpsResult<QueryResponse> {
        self.metrics.increment_get_mores();
        let result = Self::authorize(principal, ns)
            .and_then(|()| query::get_more(&self.cursors, &self.ops, ns, id, batch_size, &self.config));
        match result {
            Ok(response) => {
                if response.cursor_id == 0 {
                    self.metrics.increment_cursors_exhausted();
                }
                Ok(response)
            }
            Err(err) => {
                self.note_failure(&err, ns);
                Err(err)
            }
        }
    }

    /// Runs the query to completion and reports how it was executed
    pub fn explain(&self, request: &Value, principal: &Principal) -> OpsResult<QueryExplain> {
        let parsed = ParsedQuery::parse(request)?;
        Self::authorize(principal, &parsed.ns)?;
        let timer = Timer::new();
        let Some(handle) = self.catalog.get(&parsed.ns) else {
            return Ok(QueryExplain::from_clauses(Vec::new(), 0, timer.elapsed_millis()));
        };

        let interrupt = Interrupt::new();
        let ctx = self.context(handle, &parsed.ns, interrupt.clone());
        let _op = self.ops.register(OpKind::Explain, &parsed.ns, interrupt);

        let mut cursor = new_query_cursor(&ctx, &parsed.cursor_request())?;
        let unbounded = BatchLimits {
            max_docs: None,
            max_bytes: usize::MAX,
        };
        let mut strategy = ResponseBuildStrategy::for_query(cursor.as_ref(), &parsed, unbounded, &self.config);
        let shape = ResultShape {
            projection: None,
            chunk_filter: parsed.chunk_filter.as_ref(),
        };
        strategy.drive(cursor.as_mut(), &shape)?;
        let outcome = strategy.finish(cursor.as_ref(), &shape);
        let n = outcome.batch.len()
            + match &outcome.remainder {
                Remainder::Buffered(rest) => rest.len(),
                _ => 0,
            };
        Ok(QueryExplain::from_clauses(
            cursor.explain_info(),
            n as u64,
            timer.elapsed_millis(),
        ))
    }

    // =========================================================================
    // Cursor and operation control
    // =========================================================================

    pub fn kill_cursors(&self, ids: &[CursorId], principal: &Principal) -> usize {
        query::kill_cursors(&self.cursors, ids, principal)
    }

    /// Interrupts a running operation; false if it already finished
    pub fn kill_op(&self, op_id: Uuid) -> bool {
        self.ops.kill(op_id)
    }

    pub fn current_ops(&self) -> Vec<CurrentOp> {
        self.ops.list()
    }

    pub fn cursor_info(&self) -> CursorStats {
        self.cursors.cursor_info()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts documents, creating the collection on first use
    pub fn insert(&self, ns: &str, documents: Vec<Value>) -> OpsResult<usize> {
        let handle = self.catalog.get_or_create(ns)?;
        let mut inserted = 0;
        for document in documents {
            write_collection(&handle).insert(document)?;
            inserted += 1;
            self.note_write(ns);
        }
        Ok(inserted)
    }

    /// Removes every document matching `filter`
    pub fn remove(&self, ns: &str, filter: &Value) -> OpsResult<usize> {
        let query = QueryExpr::parse(filter)?;
        let Some(handle) = self.catalog.get(ns) else {
            return Ok(0);
        };
        let matcher = PredicateMatcher::new(&query);
        let doomed: Vec<IndexKey> = read_collection(&handle)
            .documents()
            .iter()
            .filter(|(_, document)| matcher.matches(document))
            .map(|(pk, _)| pk.clone())
            .collect();

        let mut removed = 0;
        for pk in &doomed {
            if write_collection(&handle).remove(pk).is_some() {
                removed += 1;
                self.note_write(ns);
            }
        }
        Ok(removed)
    }

    fn note_write(&self, ns: &str) {
        if self.cache.note_write(ns) {
            Logger::trace(
                Event::PlanCacheCleared.as_str(),
                &[("ns", ns), ("reason", "write_threshold")],
            );
        }
    }

    fn clear_plans(&self, ns: &str, reason: &str) {
        let cleared = self.cache.clear_namespace(ns);
        Logger::trace(
            Event::PlanCacheCleared.as_str(),
            &[
                ("ns", ns),
                ("reason", reason),
                ("entries", cleared.to_string().as_str()),
            ],
        );
    }

    /// Drops a collection; returns how many cursors were invalidated
    pub fn drop_collection(&self, ns: &str) -> usize {
        self.catalog.drop_collection(ns);
        self.clear_plans(ns, "drop_collection");
        self.cursors.invalidate_namespace(ns)
    }

    pub fn drop_database(&self, db: &str) -> usize {
        for ns in self.catalog.drop_database(db) {
            self.clear_plans(&ns, "drop_database");
        }
        self.cursors.invalidate_database(db)
    }

    pub fn create_index(&self, ns: &str, key: &Value, name: Option<String>) -> OpsResult<String> {
        let pattern = KeyPattern::from_json(key).map_err(StorageError::from)?;
        let handle = self.catalog.get_or_create(ns)?;
        let name = write_collection(&handle).create_index(pattern, name)?;
        self.clear_plans(ns, "create_index");
        Ok(name)
    }

    pub fn drop_index(&self, ns: &str, name: &str) -> OpsResult<()> {
        let handle = self
            .catalog
            .get(ns)
            .ok_or_else(|| StorageError::index_not_found(name))?;
        write_collection(&handle).drop_index(name)?;
        self.clear_plans(ns, "drop_index");
        Ok(())
    }
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new(ExecutorConfig::default(), CursorConfig::default())
    }
}
