//! Fire-and-forget delivery of in-app notifications and transactional
//! email. The engine treats both as best-effort outputs: failures are
//! logged and never roll back anything the processor already wrote.

use crate::store::Store;

/// Stores in-app notifications. `create` logs failures instead of returning
/// them; a lost notification is an annoyance, a failed fraud job is not.
#[derive(Clone)]
pub struct NotificationSink {
    store: Store,
}

impl NotificationSink {
    pub fn new(store: Store) -> Self {
        NotificationSink { store }
    }

    pub fn create(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
        link: &str,
        source_type: &str,
        source_id: &str,
    ) {
        match self
            .store
            .insert_notification(user_id, title, message, link, source_type, source_id)
        {
            Ok(id) => log::debug!("Notification {id} created for user {user_id}"),
            Err(e) => log::warn!("Failed to create notification for user {user_id}: {e}"),
        }
    }
}

/// Outbound email collaborator. The worker rate-limits dispatch to the
/// provider's throughput cap; implementations just send one message.
pub trait EmailSink: Send + Sync {
    fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()>;
}

/// Default sink for deployments without an email provider wired up: logs
/// the message instead of sending it.
pub struct LogEmailSink;

impl EmailSink for LogEmailSink {
    fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        log::info!(
            "Email (log sink) to {to}: '{subject}' ({} bytes of html)",
            html.len()
        );
        Ok(())
    }
}

/// In-app copy for a fraud-alert, in the marketplace's locale. Sellers see
/// which listing tripped review and how many findings there were, never raw
/// rule internals.
pub fn fraud_alert_notification(listing_title: &str, violation_count: usize) -> (String, String) {
    let title = "허위매물 의심 안내".to_string();
    let message = format!(
        "회원님의 매물 '{listing_title}'에서 {violation_count}건의 위반 의심 사항이 감지되었습니다. \
         대시보드에서 상세 내용을 확인해 주세요."
    );
    (title, message)
}

/// Link target for fraud-alert notifications.
pub const SELLER_DASHBOARD_LINK: &str = "/dashboard/violations";

/// Templated fraud-alert email, one per violation batch per seller.
pub fn fraud_alert_email(
    user_name: &str,
    listing_title: &str,
    violation_count: usize,
) -> (String, String) {
    let subject = format!("[매물안심] 매물 '{listing_title}' 검토 안내");
    let html = format!(
        "<html><body>\
         <p>{user_name}님, 안녕하세요.</p>\
         <p>회원님의 매물 <strong>{listing_title}</strong>에서 \
         {violation_count}건의 위반 의심 사항이 감지되어 검토가 진행 중입니다.</p>\
         <p>검토 결과에 따라 매물 노출이 제한될 수 있으며, \
         <a href=\"{SELLER_DASHBOARD_LINK}\">판매자 대시보드</a>에서 \
         소명 자료를 제출하실 수 있습니다.</p>\
         <p>매물안심 드림</p>\
         </body></html>"
    );
    (subject, html)
}
