pub mod handler;
pub mod userctx;
pub mod wsdocs;
