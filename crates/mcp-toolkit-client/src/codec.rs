//! Envelope encoding and decoding shared by every transport.
//!
//! Decoding is structural only: it checks that the bytes form a response
//! envelope and leaves the meaning of `result` to the caller.

use serde_json::{Map, Value};

use crate::error::{McpError, Result};
use crate::protocol::{JSONRPC_VERSION, JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// Encode a request as compact JSON.
///
/// The output never contains a raw newline, which the stdio framing relies on.
pub fn encode(request: &JsonRpcRequest) -> Result<Vec<u8>> {
    serde_json::to_vec(request).map_err(|source| McpError::Encode {
        method: request.method.clone(),
        source,
    })
}

/// Decode a response envelope.
pub fn decode(bytes: &[u8]) -> Result<JsonRpcResponse> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| McpError::decode(format!("invalid JSON: {e}")))?;

    let Value::Object(object) = value else {
        return Err(McpError::decode("response is not a JSON object"));
    };

    from_object(object)
}

fn from_object(mut object: Map<String, Value>) -> Result<JsonRpcResponse> {
    let jsonrpc = match object.remove("jsonrpc") {
        None => JSONRPC_VERSION.to_string(),
        Some(Value::String(v)) if v == JSONRPC_VERSION => v,
        Some(other) => {
            return Err(McpError::decode(format!(
                "unsupported jsonrpc version: {other}"
            )));
        }
    };

    let id = match object.remove("id") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(
            n.as_u64()
                .ok_or_else(|| McpError::decode(format!("invalid response id: {n}")))?,
        ),
        Some(other) => return Err(McpError::decode(format!("invalid response id: {other}"))),
    };

    // `"result": null` is a present result, so look at keys rather than values.
    let result = object.remove("result");
    let error = object
        .remove("error")
        .map(serde_json::from_value::<JsonRpcError>)
        .transpose()
        .map_err(|e| McpError::decode(format!("malformed error object: {e}")))?;

    match (&result, &error) {
        (Some(_), Some(_)) => {
            return Err(McpError::decode("response carries both result and error"));
        }
        (None, None) => {
            return Err(McpError::decode("response carries neither result nor error"));
        }
        _ => {}
    }

    if id.is_none() && error.is_none() {
        return Err(McpError::decode("response is missing an id"));
    }

    Ok(JsonRpcResponse {
        jsonrpc,
        id,
        result,
        error,
    })
}
