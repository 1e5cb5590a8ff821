pub mod password;
pub mod share_links;
pub mod tokens;
