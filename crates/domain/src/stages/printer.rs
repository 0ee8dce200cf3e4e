use message_bus::{Handler, Payload};

use crate::messages::OrderEnvelope;

/// Logs every message it receives as one structured line.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrderPrinter;

impl Handler<OrderEnvelope> for OrderPrinter {
    fn handle(&self, message: OrderEnvelope) -> message_bus::Result<()> {
        let order = message
            .payload
            .order()
            .map(serde_json::to_string)
            .transpose()?
            .unwrap_or_default();
        tracing::info!(
            kind = message.payload.kind(),
            message_id = %message.message_id,
            causation_id = ?message.causation_id.map(|id| id.to_string()),
            correlation_id = %message.correlation_id,
            order = %order,
            "order message"
        );
        Ok(())
    }

    fn name(&self) -> String {
        "order-printer".to_string()
    }
}
