/// Viewer page: the MJPEG feed plus a status panel refreshed from `/data`.
pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>camwatch</title>
  <style>
    :root {
      --bg: #0f1418;
      --panel: #182128;
      --text: #d8e1e8;
      --muted: #7d8b96;
      --ok: #2ecc71;
      --bad: #e74c3c;
    }
    body {
      margin: 0;
      padding: 20px;
      background: var(--bg);
      color: var(--text);
      font-family: "DejaVu Sans Mono", Menlo, monospace;
    }
    main {
      max-width: 1100px;
      margin: 0 auto;
    }
    h1 {
      font-size: 18px;
      letter-spacing: 0.08em;
      text-transform: uppercase;
    }
    #feed {
      display: block;
      width: 100%;
      height: auto;
      border-radius: 4px;
      background: #000;
    }
    .panels {
      display: flex;
      flex-wrap: wrap;
      gap: 12px;
      margin-top: 16px;
    }
    .panel {
      flex: 1 1 200px;
      background: var(--panel);
      border-radius: 4px;
      padding: 12px 16px;
    }
    .panel h2 {
      margin: 0 0 8px;
      font-size: 12px;
      color: var(--muted);
      text-transform: uppercase;
    }
    .value {
      font-size: 24px;
      font-weight: bold;
    }
    .dot {
      display: inline-block;
      width: 10px;
      height: 10px;
      margin-right: 6px;
      border-radius: 50%;
      background: var(--muted);
    }
    .dot.connected { background: var(--ok); }
    .dot.disconnected { background: var(--bad); }
    .muted { color: var(--muted); }
  </style>
</head>
<body>
  <main>
    <h1>camwatch</h1>
    <img id="feed" src="/video_feed" alt="Camera stream" />
    <section class="panels">
      <div class="panels" id="counts"></div>
      <div class="panel">
        <h2>Camera</h2>
        <div><span class="dot" id="status-dot"></span><span id="status">Unknown</span></div>
        <div class="muted" id="source">-</div>
      </div>
      <div class="panel">
        <h2>Last analysis</h2>
        <div id="last-update">Never</div>
        <div class="muted" id="age">-</div>
        <div class="muted" id="frequency"></div>
      </div>
    </section>
  </main>
  <script>
    const countsEl = document.getElementById("counts");

    function renderCounts(counts) {
      countsEl.replaceChildren();
      for (const [name, value] of Object.entries(counts)) {
        const panel = document.createElement("div");
        panel.className = "panel";
        const title = document.createElement("h2");
        title.textContent = name;
        const number = document.createElement("div");
        number.className = "value";
        number.textContent = value;
        panel.append(title, number);
        countsEl.append(panel);
      }
    }

    async function refresh() {
      try {
        const response = await fetch("/data", { cache: "no-store" });
        const data = await response.json();
        renderCounts(data.counts);

        const connected = data.camera.status === "connected";
        document.getElementById("status-dot").className =
          "dot " + (connected ? "connected" : "disconnected");
        document.getElementById("status").textContent =
          connected ? "Connected" : "Disconnected";
        document.getElementById("source").textContent = data.camera.source ?? "-";

        document.getElementById("last-update").textContent = data.analysis.last_update;
        document.getElementById("age").textContent =
          data.analysis.seconds_since_update === null
            ? "-"
            : `${data.analysis.seconds_since_update} seconds ago`;
        document.getElementById("frequency").textContent =
          `every ${data.analysis.update_frequency}`;
      } catch (err) {
        console.error("Failed to fetch /data", err);
      }
    }

    refresh();
    setInterval(refresh, 2000);
  </script>
</body>
</html>
"#;
