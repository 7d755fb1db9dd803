//! Account-level service opening (ONS, VS)
//!
//! Opening a service is a one-shot order against a fixed regional endpoint.
//! A second order fails with an "already opened" code, which counts as success.

use crate::client::{AliyunClient, ONS_OPEN, Product, VS_OPEN};
use crate::error::Result;
use crate::request::RpcRequest;
use crate::retry::ApiCall;

const QPS_LIMIT_EXCEEDED: &str = "QPS Limit Exceeded";

/// Status reported once the service is open
pub const OPENED_STATUS: &str = "Opened";

/// One openable service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenService {
    pub product: Product,
    pub action: &'static str,
    /// Error code meaning the service was opened earlier
    pub opened_code: &'static str,
    pub opened_id: &'static str,
    pub not_opened_id: &'static str,
}

pub const ONS: OpenService = OpenService {
    product: ONS_OPEN,
    action: "OpenOnsService",
    opened_code: "OrderOpend",
    opened_id: "OnsServiceHasBeenOpened",
    not_opened_id: "OnsServiceHasNotBeenOpened",
};

pub const VS: OpenService = OpenService {
    product: VS_OPEN,
    action: "OpenVsService",
    opened_code: "ORDER.OPEND",
    opened_id: "VsServiceHasBeenOpened",
    not_opened_id: "VsServiceHasNotBeenOpened",
};

impl OpenService {
    /// Open the service when `enable` is set
    ///
    /// Returns the data source ID and status: the opened pair on success, the
    /// not-opened ID and an empty status when nothing was requested.
    pub async fn open(&self, client: &AliyunClient, enable: bool) -> Result<(String, String)> {
        if !enable {
            return Ok((self.not_opened_id.to_string(), String::new()));
        }

        let call = ApiCall::new(self.product, self.action, RpcRequest::new())
            .retry_on(&[QPS_LIMIT_EXCEEDED]);
        match call.send(client).await {
            Ok(_) => log::info!("Opened {} service", self.product.code),
            Err(err) if err.is_expected(&[self.opened_code]) => {
                log::debug!("{} service was already open", self.product.code)
            }
            Err(err) => return Err(err.with_action(self.product.code, self.action)),
        }
        Ok((self.opened_id.to_string(), OPENED_STATUS.to_string()))
    }
}
