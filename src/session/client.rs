use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::engine::exceptions::NewException;
use crate::engine::lifecycle::{NewOrder, PodPayload, StatusUpdate};
use crate::engine::routing::NewRoute;
use crate::models::exception::{ExceptionStatus, LogisticsException};
use crate::models::fleet::{Driver, GeoPoint, NewDriver, NewVehicle, Vehicle};
use crate::models::history::StatusHistoryEntry;
use crate::models::order::{Order, OrderStatus, StopStatus};
use crate::models::route::{Route, RouteDetail};
use crate::models::tracking::TrackingView;
use crate::session::credentials::{CredentialStore, FileStore, MemoryStore};
use crate::session::error::SessionError;
use crate::session::manager::{Session, decode};
use crate::session::transport::{ApiRequest, HttpTransport};

/// Typed wrappers over the dispatch REST API. Everything except tracking goes
/// through the authenticated [`Session`].
pub struct ApiClient {
    session: Arc<Session>,
}

impl ApiClient {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// HTTP transport plus a file store when a credentials path is configured,
    /// an in-memory store otherwise.
    pub fn from_config(config: &ClientConfig) -> Result<Self, SessionError> {
        let transport = Arc::new(HttpTransport::new(config)?);
        let store: Arc<dyn CredentialStore> = match &config.credentials_path {
            Some(path) => Arc::new(FileStore::new(path.clone())),
            None => Arc::new(MemoryStore::default()),
        };
        let session = Session::restore(transport, store)?;
        Ok(Self::new(Arc::new(session)))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn list_drivers(&self) -> Result<Vec<Driver>, SessionError> {
        self.call(ApiRequest::get("/drivers")).await
    }

    pub async fn create_driver(&self, driver: &NewDriver) -> Result<Driver, SessionError> {
        self.call(ApiRequest::post("/drivers", to_body(driver)?)).await
    }

    pub async fn update_driver_location(
        &self,
        driver_id: Uuid,
        location: GeoPoint,
    ) -> Result<Driver, SessionError> {
        self.call(ApiRequest::patch(
            format!("/drivers/{driver_id}/location"),
            json!({ "location": location }),
        ))
        .await
    }

    pub async fn list_vehicles(&self) -> Result<Vec<Vehicle>, SessionError> {
        self.call(ApiRequest::get("/vehicles")).await
    }

    pub async fn create_vehicle(&self, vehicle: &NewVehicle) -> Result<Vehicle, SessionError> {
        self.call(ApiRequest::post("/vehicles", to_body(vehicle)?)).await
    }

    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, SessionError> {
        let path = match status {
            Some(status) => format!("/orders?status={status}"),
            None => "/orders".to_string(),
        };
        self.call(ApiRequest::get(path)).await
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, SessionError> {
        self.call(ApiRequest::get(format!("/orders/{order_id}"))).await
    }

    pub async fn order_history(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<StatusHistoryEntry>, SessionError> {
        self.call(ApiRequest::get(format!("/orders/{order_id}/history")))
            .await
    }

    pub async fn create_order(&self, order: &NewOrder) -> Result<Order, SessionError> {
        self.call(ApiRequest::post("/orders", to_body(order)?)).await
    }

    pub async fn cancel_order(&self, order_id: Uuid, reason: &str) -> Result<Order, SessionError> {
        self.call(ApiRequest::post(
            format!("/orders/{order_id}/cancel"),
            json!({ "reason": reason }),
        ))
        .await
    }

    pub async fn reassign_order(
        &self,
        order_id: Uuid,
        target_route_id: Uuid,
        note: &str,
    ) -> Result<Order, SessionError> {
        self.call(ApiRequest::post(
            format!("/orders/{order_id}/reassign"),
            json!({ "target_route_id": target_route_id, "note": note }),
        ))
        .await
    }

    pub async fn list_routes(&self) -> Result<Vec<Route>, SessionError> {
        self.call(ApiRequest::get("/routes")).await
    }

    pub async fn get_route(&self, route_id: Uuid) -> Result<Route, SessionError> {
        self.call(ApiRequest::get(format!("/routes/{route_id}"))).await
    }

    pub async fn create_route(&self, route: &NewRoute) -> Result<Route, SessionError> {
        self.call(ApiRequest::post("/routes", to_body(route)?)).await
    }

    pub async fn reorder_route(
        &self,
        route_id: Uuid,
        stop_order: &[Uuid],
    ) -> Result<Route, SessionError> {
        self.call(ApiRequest::post(
            format!("/routes/{route_id}/reorder"),
            json!({ "stop_order": stop_order }),
        ))
        .await
    }

    pub async fn start_route(&self, route_id: Uuid) -> Result<Route, SessionError> {
        self.call(ApiRequest::post(
            format!("/driver/routes/{route_id}/start"),
            json!({}),
        ))
        .await
    }

    pub async fn today_route(&self) -> Result<RouteDetail, SessionError> {
        self.call(ApiRequest::get("/driver/routes/today")).await
    }

    pub async fn driver_route(&self, route_id: Uuid) -> Result<RouteDetail, SessionError> {
        self.call(ApiRequest::get(format!("/driver/routes/{route_id}")))
            .await
    }

    /// Resolves a scanned reference code among the driver's routes.
    pub async fn scan(&self, code: &str) -> Result<Order, SessionError> {
        self.call(ApiRequest::post("/driver/scan", json!({ "code": code })))
            .await
    }

    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        to_status: OrderStatus,
        update: &StatusUpdate,
    ) -> Result<Order, SessionError> {
        let mut body = to_body(update)?;
        if let Value::Object(fields) = &mut body {
            fields.insert("to_status".to_string(), json!(to_status));
        }
        self.call(ApiRequest::post(
            format!("/driver/orders/{order_id}/status"),
            body,
        ))
        .await
    }

    pub async fn submit_pod(&self, order_id: Uuid, pod: &PodPayload) -> Result<Order, SessionError> {
        self.call(ApiRequest::post(
            format!("/driver/orders/{order_id}/pod"),
            to_body(pod)?,
        ))
        .await
    }

    pub async fn update_stop_status(
        &self,
        order_id: Uuid,
        stop_id: Uuid,
        to_status: StopStatus,
    ) -> Result<Order, SessionError> {
        self.call(ApiRequest::post(
            format!("/driver/orders/{order_id}/stops/{stop_id}/status"),
            json!({ "to_status": to_status }),
        ))
        .await
    }

    pub async fn list_exceptions(
        &self,
        status: Option<ExceptionStatus>,
    ) -> Result<Vec<LogisticsException>, SessionError> {
        let path = match status {
            Some(status) => format!("/exceptions?status={status}"),
            None => "/exceptions".to_string(),
        };
        self.call(ApiRequest::get(path)).await
    }

    pub async fn record_exception(
        &self,
        exception: &NewException,
    ) -> Result<LogisticsException, SessionError> {
        self.call(ApiRequest::post("/exceptions", to_body(exception)?))
            .await
    }

    pub async fn acknowledge_exception(
        &self,
        exception_id: Uuid,
        note: &str,
    ) -> Result<LogisticsException, SessionError> {
        self.call(ApiRequest::post(
            format!("/exceptions/{exception_id}/ack"),
            json!({ "note": note }),
        ))
        .await
    }

    pub async fn resolve_exception(
        &self,
        exception_id: Uuid,
        resolution: &str,
    ) -> Result<LogisticsException, SessionError> {
        self.call(ApiRequest::post(
            format!("/exceptions/{exception_id}/resolve"),
            json!({ "resolution": resolution }),
        ))
        .await
    }

    /// Public lookup; sent without a bearer.
    pub async fn track(&self, token: &str) -> Result<TrackingView, SessionError> {
        let response = self
            .session
            .execute_public(ApiRequest::get(format!("/tracking/{token}")))
            .await?;
        decode(response)
    }

    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, SessionError> {
        let response = self.session.execute(request).await?;
        decode(response)
    }
}

fn to_body<T: Serialize>(value: &T) -> Result<Value, SessionError> {
    serde_json::to_value(value)
        .map_err(|err| SessionError::Decode(format!("failed to encode request: {err}")))
}
