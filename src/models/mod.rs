mod access;
mod qr;

pub use access::AccessLogEntry;
pub use qr::{
    CreateQrRequest, DeleteQrQuery, NewQrRecord, QrRecord, QrRecordWithViews, QrStatus,
    ResolveQuery,
};
