//! API Handler for aerocursor
//!
//! Decodes one request line, dispatches it to the `QueryEngine` and
//! encodes the result. Requests may run on any thread; the engine does
//! its own locking.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::observability::{Event, Logger};
use crate::ops::{Principal, QueryEngine};

use super::errors::ApiResult;
use super::request::Request;
use super::response::Response;

pub struct ApiHandler {
    engine: Arc<QueryEngine>,
}

impl ApiHandler {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<QueryEngine> {
        &self.engine
    }

    /// Handle a raw JSON request string
    pub fn handle(&self, json_request: &str) -> Response {
        let (request, principal) = match Request::parse(json_request) {
            Ok(parsed) => parsed,
            Err(e) => {
                Logger::warn(
                    Event::RequestFailed.as_str(),
                    &[("code", e.code()), ("reason", e.message())],
                );
                return Response::error(&e);
            }
        };

        let op = request.op();
        match self.dispatch(request, &principal) {
            Ok(data) => Response::success(data),
            Err(e) => {
                let fields = [("op", op), ("code", e.code()), ("reason", e.message())];
                if e.is_rejection() {
                    Logger::warn(Event::RequestFailed.as_str(), &fields);
                } else {
                    Logger::error(Event::RequestFailed.as_str(), &fields);
                }
                Response::error(&e)
            }
        }
    }

    fn dispatch(&self, request: Request, principal: &Principal) -> ApiResult<Value> {
        let engine = &self.engine;
        let data = match request {
            Request::Find(body) => engine.find(&body, principal)?.to_json(),
            Request::GetMore {
                ns,
                cursor_id,
                batch_size,
            } => engine.get_more(&ns, cursor_id, batch_size, principal)?.to_json(),
            Request::KillCursors { ids } => {
                json!({"killed": engine.kill_cursors(&ids, principal)})
            }
            Request::KillOp { op_id } => json!({"killed": engine.kill_op(op_id)}),
            Request::CurrentOp => json!({"inprog": engine.current_ops()}),
            Request::Insert { ns, documents } => {
                json!({"inserted": engine.insert(&ns, documents)?})
            }
            Request::Remove { ns, filter } => json!({"removed": engine.remove(&ns, &filter)?}),
            Request::Drop { ns } => {
                json!({"cursorsInvalidated": engine.drop_collection(&ns)})
            }
            Request::DropDatabase { db } => {
                json!({"cursorsInvalidated": engine.drop_database(&db)})
            }
            Request::CreateIndex { ns, key, name } => {
                json!({"name": engine.create_index(&ns, &key, name)?})
            }
            Request::DropIndex { ns, name } => {
                engine.drop_index(&ns, &name)?;
                json!({"dropped": name})
            }
            Request::CursorInfo => json!(engine.cursor_info()),
            Request::Explain(body) => engine.explain(&body, principal)?.to_json(),
            Request::Metrics => json!(engine.metrics()),
        };
        Ok(data)
    }
}
