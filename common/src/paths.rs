pub const ROUTE_READ: &str = "/read";

pub const TEMPLATE_FILE: &str = "/graph.html";
pub const SPIFFS_BASE_PATH: &str = "/spiffs";
