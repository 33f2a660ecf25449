//! Live-reload messages and the hub that broadcasts them.

use quire_pipeline::{ReloadEvent, ReloadSink};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Path of the websocket endpoint.
pub const RELOAD_SOCKET_PATH: &str = "/__livereload";

/// Path of the client script.
pub const RELOAD_SCRIPT_PATH: &str = "/__livereload.js";

/// Messages sent to browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Full page reload
    Reload,

    /// Refresh stylesheets in place
    Css,

    /// A rebuild failed; the page keeps showing the last good build
    BuildFailed { task: String, message: String },

    /// Connection established
    Connected,
}

impl ReloadMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<ReloadEvent> for ReloadMessage {
    fn from(event: ReloadEvent) -> Self {
        match event {
            ReloadEvent::Full => Self::Reload,
            ReloadEvent::Styles => Self::Css,
            ReloadEvent::BuildFailed { task, message } => Self::BuildFailed { task, message },
        }
    }
}

/// Broadcasts reload messages to every connected browser.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    pub fn send(&self, msg: ReloadMessage) {
        // No receivers just means no browser is open.
        let _ = self.sender.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadSink for ReloadHub {
    fn notify(&self, event: ReloadEvent) {
        let msg = ReloadMessage::from(event);
        tracing::debug!(clients = self.subscriber_count(), ?msg, "broadcasting");
        self.send(msg);
    }
}

/// Client-side script connecting a page to the reload socket.
pub fn reload_client_script() -> String {
    format!(
        r#"
(function() {{
  'use strict';

  var url = (location.protocol === 'https:' ? 'wss://' : 'ws://') + location.host + '{socket}';
  var attempts = 0;

  function refreshStyles() {{
    document.querySelectorAll('link[rel="stylesheet"]').forEach(function(link) {{
      var href = link.href.replace(/[?&]livereload=\d+/, '');
      link.href = href + (href.indexOf('?') < 0 ? '?' : '&') + 'livereload=' + Date.now();
    }});
  }}

  function connect() {{
    var ws = new WebSocket(url);

    ws.onopen = function() {{
      if (attempts > 0) {{
        location.reload();
      }}
      attempts = 0;
    }};

    ws.onmessage = function(event) {{
      var msg = JSON.parse(event.data);
      switch (msg.type) {{
        case 'reload':
          location.reload();
          break;
        case 'css':
          refreshStyles();
          break;
        case 'build_failed':
          console.error('[quire] ' + msg.task + ' failed: ' + msg.message);
          break;
        case 'connected':
          console.log('[quire] live reload connected');
          break;
      }}
    }};

    ws.onclose = function() {{
      if (attempts < 10) {{
        attempts++;
        setTimeout(connect, 1000 * attempts);
      }}
    }};
  }}

  connect();
}})();
"#,
        socket = RELOAD_SOCKET_PATH
    )
}
