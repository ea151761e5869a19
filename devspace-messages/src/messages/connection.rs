//! Extension-server connection messages

pub struct ConnectionMessages {
    pub closed_title: &'static str,
    pub closed: &'static str,
    pub retries_exhausted_title: &'static str,
    pub retries_exhausted: &'static str,
    pub url_invalid: &'static str,
    pub url_missing: &'static str,
}

pub const CONNECTION_MESSAGES: ConnectionMessages = ConnectionMessages {
    closed_title: "Connection error",
    closed: "Unable to track the workspace status due to connection closed error. Please, try again.",
    retries_exhausted_title: "Workspace Connection Error",
    retries_exhausted: "It seems that your workspace is running, but we cannot connect to it at {url} after {attempts} attempts. This commonly happens when the workspace host address is not reachable from this machine. Check the address the server advertises for workspaces and try again.",
    url_invalid: "Invalid extension server URL '{url}': {error}",
    url_missing: "Unable to create project in workspace. Error when trying to get websocket URL.",
};
