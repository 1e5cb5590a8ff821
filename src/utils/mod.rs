pub mod csv_export;
pub mod date_range;
pub mod form;
pub mod http_client;
pub mod mime_utils;
pub mod multipart_utils;
pub mod pagination;
