//! Runs the clauses of a top-level `$or` one after another
//!
//! Each clause gets its own cursor (planned independently, so each may use
//! a different index). Clause boundaries are invisible to callers: when a
//! clause's cursor runs out, the next clause starts within the same
//! `advance()`. A document matched by several clauses is reported as a
//! duplicate after its first appearance.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;

use crate::index::{IndexKey, KeyPart, KeyPattern};
use crate::observability::{Event, Logger};
use crate::planner::{ClauseExplain, ClauseSpec};

use super::cursor::QueryCursor;
use super::dedup::DupSet;
use super::errors::{ExecutorError, ExecutorResult};
use super::generator::{clause_cursor, CursorContext};
use super::matcher::Matcher;

pub struct OrClauseSequencer {
    ctx: CursorContext,
    pending: VecDeque<ClauseSpec>,
    current: Box<dyn QueryCursor>,
    finished: Vec<ClauseExplain>,
    dups: DupSet,
    failed: Option<ExecutorError>,
}

impl OrClauseSequencer {
    /// Plans the first non-empty clause and positions on its first document
    pub fn new(ctx: CursorContext, clauses: Vec<ClauseSpec>) -> ExecutorResult<Self> {
        let mut pending: VecDeque<ClauseSpec> = clauses.into();
        let first = pending
            .pop_front()
            .ok_or_else(|| ExecutorError::query_invalid("$or requires at least one clause"))?;
        let current = clause_cursor(&ctx, &first)?;
        let dups = DupSet::new(ctx.config.dedup_upgrade_threshold);
        let mut sequencer = Self {
            ctx,
            pending,
            current,
            finished: Vec::new(),
            dups,
            failed: None,
        };
        sequencer.skip_exhausted_clauses()?;
        Ok(sequencer)
    }

    fn skip_exhausted_clauses(&mut self) -> ExecutorResult<()> {
        while !self.current.ok() {
            let Some(next) = self.pending.pop_front() else {
                return Ok(());
            };
            let cursor = clause_cursor(&self.ctx, &next)?;
            let done = std::mem::replace(&mut self.current, cursor);
            self.finished.extend(done.explain_info());
            Logger::trace(
                Event::OrClauseAdvanced.as_str(),
                &[
                    ("ns", self.ctx.ns.as_str()),
                    ("clause", next.position().to_string().as_str()),
                ],
            );
        }
        Ok(())
    }

    /// Clauses not yet started
    pub fn remaining_clauses(&self) -> usize {
        self.pending.len()
    }

    fn fail(&mut self, err: ExecutorError) -> ExecutorError {
        self.failed = Some(err.clone());
        err
    }
}

impl QueryCursor for OrClauseSequencer {
    fn ok(&self) -> bool {
        self.failed.is_none() && self.current.ok()
    }

    fn advance(&mut self) -> ExecutorResult<bool> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if let Err(err) = self.current.advance() {
            return Err(self.fail(err));
        }
        if let Err(err) = self.skip_exhausted_clauses() {
            return Err(self.fail(err));
        }
        Ok(self.ok())
    }

    fn current(&self) -> ExecutorResult<&Value> {
        match &self.failed {
            Some(_) => Err(ExecutorError::invalid_access("current")),
            None => self.current.current(),
        }
    }

    fn curr_key(&self) -> ExecutorResult<&[KeyPart]> {
        match &self.failed {
            Some(_) => Err(ExecutorError::invalid_access("curr_key")),
            None => self.current.curr_key(),
        }
    }

    fn curr_pk(&self) -> ExecutorResult<&IndexKey> {
        match &self.failed {
            Some(_) => Err(ExecutorError::invalid_access("curr_pk")),
            None => self.current.curr_pk(),
        }
    }

    fn matcher(&self) -> Option<Arc<dyn Matcher>> {
        self.current.matcher()
    }

    fn current_matches(&mut self) -> bool {
        self.ok() && self.current.current_matches()
    }

    /// Both sets must see the key: the clause cursor for its own
    /// interleaving and the global set across clauses
    fn getsetdup(&mut self, pk: &IndexKey) -> bool {
        let within_clause = self.current.getsetdup(pk);
        let across_clauses = self.dups.getsetdup(pk);
        within_clause || across_clauses
    }

    fn index_key_pattern(&self) -> KeyPattern {
        self.current.index_key_pattern()
    }

    fn nscanned(&self) -> u64 {
        self.finished.iter().map(|c| c.nscanned).sum::<u64>() + self.current.nscanned()
    }

    fn nscanned_objects(&self) -> u64 {
        self.finished.iter().map(|c| c.nscanned_objects).sum::<u64>()
            + self.current.nscanned_objects()
    }

    fn describe(&self) -> String {
        self.current.describe()
    }

    fn explain_info(&self) -> Vec<ClauseExplain> {
        let mut clauses = self.finished.clone();
        clauses.extend(self.current.explain_info());
        clauses
    }
}
