pub mod registry;

use crate::aggregate;
use crate::error::Result;
use crate::models::{District, ResultRecord};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::store::ResultStore;
use log::{debug, info};
use registry::{ConnectionId, Outbox, Registry};
use serde_json::Value;
use tokio::sync::Mutex;

/// Owns the reference data, the result store and the open connections,
/// and dispatches every inbound frame.
///
/// The store lock is held from the upsert until both broadcasts are queued,
/// so all observers receive events in the same order.
#[derive(Debug)]
pub struct SyncService {
    districts: Vec<District>,
    store: Mutex<ResultStore>,
    registry: Registry,
}

impl SyncService {
    pub fn new(districts: Vec<District>, store: ResultStore) -> Self {
        Self {
            districts,
            store: Mutex::new(store),
            registry: Registry::new(),
        }
    }

    pub fn districts(&self) -> &[District] {
        &self.districts
    }

    pub async fn results(&self) -> Vec<ResultRecord> {
        self.store.lock().await.list().to_vec()
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    /// Registers a connection and sends it the snapshot before anything else.
    pub async fn connect(&self, outbox: Outbox) -> ConnectionId {
        let store = self.store.lock().await;
        let id = self.registry.register(outbox).await;
        info!(
            "New client connected: {} ({} open)",
            id,
            self.registry.len().await
        );
        self.send_snapshot(id, &store).await;
        id
    }

    pub async fn disconnect(&self, id: ConnectionId) {
        if self.registry.unregister(id).await {
            info!(
                "Client disconnected: {} ({} open)",
                id,
                self.connection_count().await
            );
        }
    }

    /// Parses and dispatches one inbound text frame. Anything that cannot be
    /// handled is dropped without a reply.
    pub async fn handle_frame(&self, id: ConnectionId, frame: &str) {
        match ClientMessage::parse(frame) {
            Ok(ClientMessage::RequestAll) => {
                let store = self.store.lock().await;
                self.send_snapshot(id, &store).await;
            }
            Ok(ClientMessage::Submit { payload }) => {
                self.submit(&id.to_string(), payload).await;
            }
            Ok(ClientMessage::Unknown) => {
                debug!("Dropping frame of unknown type from {}", id);
            }
            Err(e) => {
                debug!("Dropping unparseable frame from {}: {}", id, e);
            }
        }
    }

    /// Submission that arrived outside a socket, over `POST /api/results`.
    /// Observers see it exactly like a socket `submit`.
    pub async fn submit_payload(&self, payload: Value) {
        self.submit("http", payload).await;
    }

    async fn submit(&self, origin: &str, payload: Value) {
        let mut store = self.store.lock().await;
        let (record, kind) = match store.upsert(payload) {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!("Dropping submission from {}: {}", origin, e);
                return;
            }
        };
        info!(
            "Result {:?} from {}: record {} (division {:?}, sequence {:?}, {} held)",
            kind,
            origin,
            record.id,
            record.report.division_code(),
            record.report.sequence(),
            store.len()
        );

        self.registry.broadcast(&ServerMessage::delta(&record, kind)).await;
        self.registry
            .broadcast(&ServerMessage::ResultsAll(store.list()))
            .await;
    }

    async fn send_snapshot(&self, id: ConnectionId, store: &ResultStore) {
        self.registry
            .send_to(id, &ServerMessage::DistrictsAll(&self.districts))
            .await;
        self.registry
            .send_to(id, &ServerMessage::ResultsAll(store.list()))
            .await;
    }

    /// Server-side rendition of the observers' derived view.
    pub async fn summary(&self) -> Result<Value> {
        let store = self.store.lock().await;
        let view = aggregate::derive(&self.districts, store.list());
        Ok(serde_json::to_value(&view)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::Utf8Bytes;
    use serde_json::json;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn service() -> SyncService {
        let districts = serde_json::from_value(json!([
            {"id": "D1", "name": "One", "divisions": [{"id": "P1"}, {"id": "P2"}]}
        ]))
        .unwrap();
        SyncService::new(districts, ResultStore::new())
    }

    async fn connect(service: &SyncService) -> (ConnectionId, UnboundedReceiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (service.connect(tx).await, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Utf8Bytes>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(serde_json::from_str(frame.as_str()).unwrap());
        }
        frames
    }

    fn types(frames: &[Value]) -> Vec<&str> {
        frames.iter().map(|f| f["type"].as_str().unwrap()).collect()
    }

    fn submission(pd: &str, votes: u64) -> String {
        json!({
            "type": "submit",
            "payload": {
                "pd_code": pd,
                "summary": {"valid": votes},
                "by_party": [{"party_code": "A", "votes": votes}]
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn connect_sends_snapshot_to_the_new_connection_only() {
        let service = service();
        let (_, mut first) = connect(&service).await;
        assert_eq!(types(&drain(&mut first)), vec!["districts:all", "results:all"]);

        let (_, mut second) = connect(&service).await;
        let frames = drain(&mut second);
        assert_eq!(types(&frames), vec!["districts:all", "results:all"]);
        assert_eq!(frames[0]["data"][0]["id"], json!("D1"));
        assert!(drain(&mut first).is_empty());
    }

    #[tokio::test]
    async fn submit_broadcasts_delta_then_full_list() {
        let service = service();
        let (sender, mut sender_rx) = connect(&service).await;
        let (_, mut observer_rx) = connect(&service).await;
        drain(&mut sender_rx);
        drain(&mut observer_rx);

        service.handle_frame(sender, &submission("P1", 10)).await;
        let frames = drain(&mut observer_rx);
        assert_eq!(types(&frames), vec!["result:new", "results:all"]);
        assert_eq!(frames[0]["data"]["pd_code"], json!("P1"));
        assert_eq!(frames[1]["data"].as_array().unwrap().len(), 1);
        assert_eq!(types(&drain(&mut sender_rx)), vec!["result:new", "results:all"]);

        service.handle_frame(sender, &submission("P1", 12)).await;
        let frames = drain(&mut observer_rx);
        assert_eq!(types(&frames), vec!["result:updated", "results:all"]);
        assert_eq!(frames[1]["data"][0]["by_party"][0]["votes"], json!(12));
        assert!(frames[0]["data"]["updatedAt"].is_string());
        assert_eq!(service.results().await.len(), 1);
    }

    #[tokio::test]
    async fn request_all_resends_snapshot_to_requester() {
        let service = service();
        let (a, mut a_rx) = connect(&service).await;
        let (_, mut b_rx) = connect(&service).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        service.handle_frame(a, r#"{"type":"request:all"}"#).await;
        assert_eq!(types(&drain(&mut a_rx)), vec!["districts:all", "results:all"]);
        assert!(drain(&mut b_rx).is_empty());
    }

    #[tokio::test]
    async fn bad_frames_are_dropped_silently() {
        let service = service();
        let (id, mut rx) = connect(&service).await;
        drain(&mut rx);

        service.handle_frame(id, "{not json").await;
        service.handle_frame(id, r#"{"type":"result","data":{}}"#).await;
        service.handle_frame(id, r#"{"type":"submit"}"#).await;
        service
            .handle_frame(id, r#"{"type":"submit","payload":{"pd_code":"P1","by_party":[]}}"#)
            .await;
        service
            .handle_frame(id, r#"{"type":"submit","payload":{"pd_code":"P1","summary":{}}}"#)
            .await;

        assert!(drain(&mut rx).is_empty());
        assert!(service.results().await.is_empty());
        assert_eq!(service.connection_count().await, 1);
    }

    #[tokio::test]
    async fn disconnected_observer_stops_receiving() {
        let service = service();
        let (a, mut a_rx) = connect(&service).await;
        let (b, mut b_rx) = connect(&service).await;
        drain(&mut a_rx);
        drain(&mut b_rx);

        service.disconnect(b).await;
        service.handle_frame(a, &submission("P2", 3)).await;

        assert_eq!(drain(&mut a_rx).len(), 2);
        assert!(drain(&mut b_rx).is_empty());
        assert_eq!(service.connection_count().await, 1);
    }

    #[tokio::test]
    async fn http_submission_reaches_socket_observers() {
        let service = service();
        let (_, mut rx) = connect(&service).await;
        drain(&mut rx);

        service
            .submit_payload(json!({
                "pd_code": "P2",
                "summary": {"valid": 4},
                "by_party": [{"party_code": "B", "votes": 4}]
            }))
            .await;
        assert_eq!(types(&drain(&mut rx)), vec!["result:new", "results:all"]);

        service.submit_payload(json!({"pd_code": "P2"})).await;
        assert!(drain(&mut rx).is_empty());
        assert_eq!(service.results().await.len(), 1);
    }

    #[tokio::test]
    async fn summary_reflects_current_results() {
        let service = service();
        let (id, _rx) = connect(&service).await;
        service.handle_frame(id, &submission("P1", 10)).await;

        let summary = service.summary().await.unwrap();
        assert_eq!(summary["total_districts"], json!(1));
        assert_eq!(summary["district_rollup"][0]["coverage_ratio"], json!(0.5));
        assert_eq!(summary["winners"][0]["party_code"], json!("A"));
    }
}
