//! Traced call issuance: the pairing of identifier minting, trace
//! recording, and transport dispatch.

use std::time::Instant;

use http::HeaderName;

use crate::correlation::{CallId, CALL_ID_HEADER};
use crate::error::TransportError;
use crate::trace::CallTrace;
use crate::transport::{InterceptResponse, InterceptTransport, OutboundRequest};

/// Cap on how much response body is kept in a trace entry.
const RESPONSE_EXCERPT_CHARS: usize = 512;

/// Send one request through the transport under a freshly minted
/// correlation identifier, recording the call in `trace`.
///
/// The trace entry is appended before the send, so a call that fails
/// without a response still leaves a correlatable record carrying the
/// same identifier that went out in `x-mx-request-call-id`.
pub async fn send_traced(
    transport: &InterceptTransport,
    trace: &CallTrace,
    request: OutboundRequest,
) -> Result<InterceptResponse, TransportError> {
    send_traced_with_id(transport, trace, CallId::mint(), request).await
}

/// Same as [`send_traced`], but with an identifier forwarded by the
/// caller. The identifier is transmitted verbatim, never regenerated:
/// an id that cannot travel in a header fails with
/// [`TransportError::InvalidHeader`] before anything is issued, rather
/// than going out under a substitute value.
pub async fn send_traced_with_id(
    transport: &InterceptTransport,
    trace: &CallTrace,
    call_id: CallId,
    mut request: OutboundRequest,
) -> Result<InterceptResponse, TransportError> {
    request
        .headers
        .insert(HeaderName::from_static(CALL_ID_HEADER), call_id.header_value()?);

    // Recorded at issuance, not on completion.
    let entry = trace.begin(&call_id);
    let start = Instant::now();

    match transport.send(request).await {
        Ok(response) => {
            tracing::debug!(
                call_id = %call_id,
                status = response.status.as_u16(),
                "Intercepted call complete"
            );
            entry.complete(
                response.status.as_u16(),
                &excerpt(&response.body),
                start.elapsed(),
            );
            Ok(response)
        }
        Err(e) => {
            tracing::warn!(call_id = %call_id, error = %e, "Intercepted call failed");
            entry.fail(&e.to_string(), start.elapsed());
            Err(e)
        }
    }
}

fn excerpt(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(RESPONSE_EXCERPT_CHARS)
        .collect()
}
