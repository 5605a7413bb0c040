// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The closed set of error replies this switch may send.

/// Bytes of the offending request echoed back in an error reply.
pub const ERROR_DATA_ECHO_LEN: usize = 64;

///
/// Define a code enum with its wire values and a lookup from the raw code.
///
macro_rules! define_error_codes {
    ($name:ident { $($variant:ident = $value:expr),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum $name {
            $($variant = $value),+
        }

        impl $name {
            pub fn from_code(code: u16) -> Option<Self> {
                match code {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorType {
    HelloFailed = 0,
    BadRequest = 1,
    BadAction = 2,
    FlowModFailed = 3,
    PortModFailed = 4,
    QueueOpFailed = 5,
}

define_error_codes!(HelloFailedCode {
    Incompatible = 0,
    Eperm = 1,
});

define_error_codes!(BadRequestCode {
    BadVersion = 0,
    BadType = 1,
    BadStat = 2,
    BadVendor = 3,
    BadSubtype = 4,
    Eperm = 5,
    BadLen = 6,
    BufferEmpty = 7,
    BufferUnknown = 8,
});

define_error_codes!(BadActionCode {
    BadType = 0,
    BadLen = 1,
    BadVendor = 2,
    BadVendorType = 3,
    BadOutPort = 4,
    BadArgument = 5,
    Eperm = 6,
    TooMany = 7,
    BadQueue = 8,
});

define_error_codes!(FlowModFailedCode {
    AllTablesFull = 0,
    Overlap = 1,
    Eperm = 2,
    BadEmergTimeout = 3,
    BadCommand = 4,
    Unsupported = 5,
});

define_error_codes!(PortModFailedCode {
    BadPort = 0,
    BadHwAddr = 1,
});

define_error_codes!(QueueOpFailedCode {
    BadPort = 0,
    BadQueue = 1,
    Eperm = 2,
});

/// A valid `(type, code)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OfpErrorCode {
    HelloFailed(HelloFailedCode),
    BadRequest(BadRequestCode),
    BadAction(BadActionCode),
    FlowModFailed(FlowModFailedCode),
    PortModFailed(PortModFailedCode),
    QueueOpFailed(QueueOpFailedCode),
}

impl OfpErrorCode {
    pub fn from_pair(err_type: u16, code: u16) -> Option<Self> {
        match err_type {
            0 => HelloFailedCode::from_code(code).map(OfpErrorCode::HelloFailed),
            1 => BadRequestCode::from_code(code).map(OfpErrorCode::BadRequest),
            2 => BadActionCode::from_code(code).map(OfpErrorCode::BadAction),
            3 => FlowModFailedCode::from_code(code).map(OfpErrorCode::FlowModFailed),
            4 => PortModFailedCode::from_code(code).map(OfpErrorCode::PortModFailed),
            5 => QueueOpFailedCode::from_code(code).map(OfpErrorCode::QueueOpFailed),
            _ => None,
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            OfpErrorCode::HelloFailed(_) => ErrorType::HelloFailed,
            OfpErrorCode::BadRequest(_) => ErrorType::BadRequest,
            OfpErrorCode::BadAction(_) => ErrorType::BadAction,
            OfpErrorCode::FlowModFailed(_) => ErrorType::FlowModFailed,
            OfpErrorCode::PortModFailed(_) => ErrorType::PortModFailed,
            OfpErrorCode::QueueOpFailed(_) => ErrorType::QueueOpFailed,
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            OfpErrorCode::HelloFailed(code) => *code as u16,
            OfpErrorCode::BadRequest(code) => *code as u16,
            OfpErrorCode::BadAction(code) => *code as u16,
            OfpErrorCode::FlowModFailed(code) => *code as u16,
            OfpErrorCode::PortModFailed(code) => *code as u16,
            OfpErrorCode::QueueOpFailed(code) => *code as u16,
        }
    }

    /// Whether the reply carries the start of the offending request.
    pub fn echoes_request(&self) -> bool {
        !matches!(self, OfpErrorCode::HelloFailed(_))
    }

    /// Fixed ASCII explanation carried by hello failures.
    pub fn description(&self) -> Option<&'static str> {
        match self {
            OfpErrorCode::HelloFailed(HelloFailedCode::Incompatible) => {
                Some("Incompatible OpenFlow version")
            }
            OfpErrorCode::HelloFailed(HelloFailedCode::Eperm) => Some("Permissions error"),
            _ => None,
        }
    }
}
