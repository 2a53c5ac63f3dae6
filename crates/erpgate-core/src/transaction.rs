//! Scoped transactions over a connector

use futures::future::BoxFuture;

use crate::{Connector, ConnectorKind, ErpError, Result};

/// Flags a scope that ended before commit or rollback completed
struct OpenScope {
    kind: ConnectorKind,
    finished: bool,
}

impl Drop for OpenScope {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                kind = %self.kind,
                "transaction scope dropped before commit or rollback, transaction left open"
            );
        }
    }
}

/// Run `body` inside a transaction on `connector`.
///
/// Begins a transaction, runs the body, then commits when the body succeeds
/// or rolls back when it fails. The body's error is returned even when the
/// rollback itself fails; that failure is only logged.
///
/// If the returned future is dropped mid-body the transaction stays open on
/// the connector and `in_transaction` keeps reporting it. Pools roll such a
/// connector back before leasing it again.
///
/// ```ignore
/// let rows = transaction(&mut *conn, |c| {
///     Box::pin(async move {
///         c.execute("query", &insert_args).await?;
///         c.execute("query", &select_args).await
///     })
/// })
/// .await?;
/// ```
pub async fn transaction<T, F>(connector: &mut dyn Connector, body: F) -> Result<T>
where
    T: Send,
    F: for<'c> FnOnce(&'c mut dyn Connector) -> BoxFuture<'c, Result<T>> + Send,
{
    if !connector.is_connected() {
        return Err(ErpError::NotConnected(format!(
            "cannot begin a transaction on a disconnected {} connector",
            connector.kind()
        )));
    }

    connector.begin().await?;
    let mut scope = OpenScope {
        kind: connector.kind(),
        finished: false,
    };

    let outcome = match body(&mut *connector).await {
        Ok(value) => connector.commit().await.map(|_| value),
        Err(e) => {
            if let Err(rollback_err) = connector.rollback().await {
                tracing::warn!(
                    kind = %connector.kind(),
                    error = %rollback_err,
                    "rollback after failed transaction body failed"
                );
            }
            Err(e)
        }
    };
    scope.finished = true;
    outcome
}
