//! Request methods and response codes
//!
//! Wrappers over the `coap_lite` code types, so sessions and tests can match
//! on codes without touching packets.

use coap_lite::{MessageClass, RequestType, ResponseType};
use std::fmt;

/// Request methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Method of a request code, `None` for empty messages and responses
    pub fn from_class(class: MessageClass) -> Option<Self> {
        match class {
            MessageClass::Request(RequestType::Get) => Some(Method::Get),
            MessageClass::Request(RequestType::Post) => Some(Method::Post),
            MessageClass::Request(RequestType::Put) => Some(Method::Put),
            MessageClass::Request(RequestType::Delete) => Some(Method::Delete),
            _ => None,
        }
    }
}

impl From<Method> for RequestType {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => RequestType::Get,
            Method::Post => RequestType::Post,
            Method::Put => RequestType::Put,
            Method::Delete => RequestType::Delete,
        }
    }
}

impl From<Method> for MessageClass {
    fn from(method: Method) -> Self {
        MessageClass::Request(method.into())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Response codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    Created,
    Deleted,
    Valid,
    Changed,
    Content,
    Continue,
    BadRequest,
    Unauthorized,
    BadOption,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    NotAcceptable,
    RequestEntityIncomplete,
    PreconditionFailed,
    RequestEntityTooLarge,
    UnsupportedContentFormat,
    InternalServerError,
    NotImplemented,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
    ProxyingNotSupported,
    /// Any response code without a name above
    Other(u8),
}

impl ResponseCode {
    /// Response code of a message code, `None` for empty messages and requests
    pub fn from_class(class: MessageClass) -> Option<Self> {
        match class {
            MessageClass::Response(response) => Some(response.into()),
            MessageClass::Reserved(v) if (2..=5).contains(&(v >> 5)) => {
                Some(ResponseCode::Other(v))
            }
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            ResponseCode::Other(v) => v,
            named => u8::from(MessageClass::from(named)),
        }
    }

    pub fn class(self) -> u8 {
        self.to_u8() >> 5
    }

    pub fn detail(self) -> u8 {
        self.to_u8() & 0x1F
    }

    pub fn is_success(self) -> bool {
        self.class() == 2
    }
}

impl From<ResponseType> for ResponseCode {
    fn from(response: ResponseType) -> Self {
        match response {
            ResponseType::Created => ResponseCode::Created,
            ResponseType::Deleted => ResponseCode::Deleted,
            ResponseType::Valid => ResponseCode::Valid,
            ResponseType::Changed => ResponseCode::Changed,
            ResponseType::Content => ResponseCode::Content,
            ResponseType::Continue => ResponseCode::Continue,
            ResponseType::BadRequest => ResponseCode::BadRequest,
            ResponseType::Unauthorized => ResponseCode::Unauthorized,
            ResponseType::BadOption => ResponseCode::BadOption,
            ResponseType::Forbidden => ResponseCode::Forbidden,
            ResponseType::NotFound => ResponseCode::NotFound,
            ResponseType::MethodNotAllowed => ResponseCode::MethodNotAllowed,
            ResponseType::NotAcceptable => ResponseCode::NotAcceptable,
            ResponseType::RequestEntityIncomplete => ResponseCode::RequestEntityIncomplete,
            ResponseType::PreconditionFailed => ResponseCode::PreconditionFailed,
            ResponseType::RequestEntityTooLarge => ResponseCode::RequestEntityTooLarge,
            ResponseType::UnsupportedContentFormat => ResponseCode::UnsupportedContentFormat,
            ResponseType::InternalServerError => ResponseCode::InternalServerError,
            ResponseType::NotImplemented => ResponseCode::NotImplemented,
            ResponseType::BadGateway => ResponseCode::BadGateway,
            ResponseType::ServiceUnavailable => ResponseCode::ServiceUnavailable,
            ResponseType::GatewayTimeout => ResponseCode::GatewayTimeout,
            ResponseType::ProxyingNotSupported => ResponseCode::ProxyingNotSupported,
            other => ResponseCode::Other(u8::from(MessageClass::Response(other))),
        }
    }
}

impl From<ResponseCode> for MessageClass {
    fn from(code: ResponseCode) -> Self {
        let response = match code {
            ResponseCode::Created => ResponseType::Created,
            ResponseCode::Deleted => ResponseType::Deleted,
            ResponseCode::Valid => ResponseType::Valid,
            ResponseCode::Changed => ResponseType::Changed,
            ResponseCode::Content => ResponseType::Content,
            ResponseCode::Continue => ResponseType::Continue,
            ResponseCode::BadRequest => ResponseType::BadRequest,
            ResponseCode::Unauthorized => ResponseType::Unauthorized,
            ResponseCode::BadOption => ResponseType::BadOption,
            ResponseCode::Forbidden => ResponseType::Forbidden,
            ResponseCode::NotFound => ResponseType::NotFound,
            ResponseCode::MethodNotAllowed => ResponseType::MethodNotAllowed,
            ResponseCode::NotAcceptable => ResponseType::NotAcceptable,
            ResponseCode::RequestEntityIncomplete => ResponseType::RequestEntityIncomplete,
            ResponseCode::PreconditionFailed => ResponseType::PreconditionFailed,
            ResponseCode::RequestEntityTooLarge => ResponseType::RequestEntityTooLarge,
            ResponseCode::UnsupportedContentFormat => ResponseType::UnsupportedContentFormat,
            ResponseCode::InternalServerError => ResponseType::InternalServerError,
            ResponseCode::NotImplemented => ResponseType::NotImplemented,
            ResponseCode::BadGateway => ResponseType::BadGateway,
            ResponseCode::ServiceUnavailable => ResponseType::ServiceUnavailable,
            ResponseCode::GatewayTimeout => ResponseType::GatewayTimeout,
            ResponseCode::ProxyingNotSupported => ResponseType::ProxyingNotSupported,
            ResponseCode::Other(v) => return MessageClass::from(v),
        };
        MessageClass::Response(response)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())?;
        match self {
            ResponseCode::Other(_) => Ok(()),
            named => write!(f, " {:?}", named),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_code_values() {
        assert_eq!(ResponseCode::Created.to_u8(), 65);
        assert_eq!(ResponseCode::Deleted.to_u8(), 66);
        assert_eq!(ResponseCode::Content.to_u8(), 69);
        assert_eq!(ResponseCode::NotFound.to_u8(), 132);
        assert_eq!(ResponseCode::Other(70).to_u8(), 70);
    }

    #[test]
    fn test_response_code_display() {
        assert_eq!(ResponseCode::Created.to_string(), "2.01 Created");
        assert_eq!(ResponseCode::BadRequest.to_string(), "4.00 BadRequest");
        assert_eq!(ResponseCode::Other(70).to_string(), "2.06");
    }

    #[test]
    fn test_message_classes() {
        assert_eq!(
            ResponseCode::from_class(MessageClass::Response(ResponseType::Deleted)),
            Some(ResponseCode::Deleted)
        );
        assert_eq!(ResponseCode::from_class(MessageClass::Empty), None);
        assert_eq!(
            ResponseCode::from_class(MessageClass::Request(RequestType::Get)),
            None
        );
        assert_eq!(
            Method::from_class(MessageClass::Request(RequestType::Delete)),
            Some(Method::Delete)
        );
        assert_eq!(Method::from_class(MessageClass::Empty), None);
        assert_eq!(
            MessageClass::from(ResponseCode::Content),
            MessageClass::Response(ResponseType::Content)
        );
        assert_eq!(MessageClass::from(Method::Post), MessageClass::Request(RequestType::Post));
    }
}
