use jimeng_core::client::RequestClient;
use jimeng_core::error::AppError;
use jimeng_core::models::{CallOptions, Method};
use jimeng_core::signature::Credentials;
use jimeng_core::traits::Transport;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

pub const USER_CREDIT_URI: &str = "/commerce/v1/benefits/user_credit";
pub const CREDIT_RECEIVE_URI: &str = "/commerce/v1/benefits/credit_receive";

const RECEIVE_TIME_ZONE: &str = "Asia/Shanghai";

/// Credit balance of the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditInfo {
    pub gift_credit: i64,
    pub purchase_credit: i64,
    pub vip_credit: i64,
    pub total_credit: i64,
}

#[derive(Deserialize)]
struct UserCreditData {
    credit: CreditBalance,
}

#[derive(Deserialize)]
struct CreditBalance {
    #[serde(default)]
    gift_credit: i64,
    #[serde(default)]
    purchase_credit: i64,
    #[serde(default)]
    vip_credit: i64,
}

/// Outcome of collecting the daily credit grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditReceipt {
    #[serde(default)]
    pub receive_quota: i64,
    #[serde(default)]
    pub cur_total_credits: i64,
}

fn referer<T: Transport>(client: &RequestClient<T>) -> String {
    format!("{}/ai-tool/image/generate", client.config().region.base_url_for("/"))
}

/// Parses the `data` of a user credit lookup.
pub fn parse_credit(data: Value) -> Result<CreditInfo, AppError> {
    let UserCreditData { credit } = serde_json::from_value(data)?;
    Ok(CreditInfo {
        gift_credit: credit.gift_credit,
        purchase_credit: credit.purchase_credit,
        vip_credit: credit.vip_credit,
        total_credit: credit.gift_credit + credit.purchase_credit + credit.vip_credit,
    })
}

pub async fn fetch_credit<T: Transport>(
    client: &RequestClient<T>,
    credentials: &Credentials,
    cancel: &CancellationToken,
) -> Result<CreditInfo, AppError> {
    let options = CallOptions::json(json!({}))
        .with_header("referer", referer(client))
        .without_default_params();
    let data = client
        .call(Method::Post, USER_CREDIT_URI, credentials, &options, cancel)
        .await?;
    let info = parse_credit(data)?;

    tracing::info!(
        gift = info.gift_credit,
        purchase = info.purchase_credit,
        vip = info.vip_credit,
        total = info.total_credit,
        "Credit balance"
    );
    Ok(info)
}

/// Collects today's credit grant and returns the new balance.
pub async fn receive_credit<T: Transport>(
    client: &RequestClient<T>,
    credentials: &Credentials,
    cancel: &CancellationToken,
) -> Result<CreditReceipt, AppError> {
    let options = CallOptions::json(json!({ "time_zone": RECEIVE_TIME_ZONE }))
        .with_header("referer", referer(client));
    let data = client
        .call(Method::Post, CREDIT_RECEIVE_URI, credentials, &options, cancel)
        .await?;
    let receipt: CreditReceipt = serde_json::from_value(data)?;

    tracing::info!(
        received = receipt.receive_quota,
        total = receipt.cur_total_credits,
        "Daily credit collected"
    );
    Ok(receipt)
}
