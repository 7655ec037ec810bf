//! Host layer of the merged page
//!
//! Markup around the scripts, the shared state (entity table, display order,
//! mode dispatcher and controller factory), the host routines that replace
//! the modules' own lifecycle hooks, and the bootstrap that registers one
//! controller per module.

use crate::{config::DataAlias, namespace_map::js_string};

/// Routines the host declares; modules must not bring their own
pub const HOST_ROUTINES: &[&str] = &["buildMap", "selectRegion", "setMode"];

/// State bindings the host declares
pub const HOST_STATE: &[&str] = &["modeDispatcher", "createController"];

/// One runtime mode and the entry it routes to
#[derive(Debug, Clone, Copy)]
pub struct ModeView<'a> {
    pub mode: &'a str,
    pub label: &'a str,
    pub entry: &'a str,
}

#[derive(Debug, Clone)]
pub struct Shell<'a> {
    pub title: &'a str,
    pub entity: &'a str,
    pub order: &'a str,
    pub sequence: Vec<&'a str>,
    /// Constant holding per-key tile geometry (`{vb, d}`)
    pub tiles: Option<&'a str>,
    /// Host field shown on each tile and in the banner title
    pub label_field: Option<&'a str>,
    /// Host field shown under the banner title
    pub detail_field: Option<&'a str>,
    /// Primary mode first; it starts active
    pub modes: Vec<ModeView<'a>>,
}

const STYLE: &str = "<style>
:root { --ink: #1a1a2e; --muted: #5c636a; --accent: #2372b9; --panel: #f5f7fa; }
* { box-sizing: border-box; }
body { margin: 0; font-family: system-ui, -apple-system, 'Segoe UI', sans-serif; color: var(--ink); }
header { padding: 32px 24px 8px; }
#progress-bar { position: fixed; top: 0; left: 0; height: 3px; width: 0; background: var(--accent); z-index: 10; }
#map-container { display: grid; grid-template-columns: repeat(auto-fill, minmax(104px, 1fr)); gap: 8px; padding: 16px 24px; }
.region-tile { display: flex; flex-direction: column; align-items: center; gap: 4px; padding: 8px; border: 1px solid #d5dae1; border-radius: 6px; background: #fff; cursor: pointer; font: inherit; }
.region-tile svg { width: 100%; height: 48px; fill: var(--muted); }
.region-tile.active { border-color: var(--accent); }
.region-tile.active svg { fill: var(--accent); }
.tile-name { font-size: 0.8rem; }
#region-banner { padding: 8px 24px; background: var(--panel); }
#region-subtitle { color: var(--muted); margin-top: 0; }
#mode-toggle { display: flex; gap: 8px; padding: 16px 24px; }
.mode-btn { padding: 8px 16px; border: 1px solid var(--accent); border-radius: 4px; background: #fff; color: var(--accent); cursor: pointer; font: inherit; }
.mode-btn.active { background: var(--accent); color: #fff; }
.mode-container { display: none; padding: 0 24px 48px; }
.mode-container.visible { display: block; }
</style>
";

const DISPATCHER: &str = "const modeDispatcher = {
  controllers: {},
  current: null,
  register(controller) {
    this.controllers[controller.mode] = controller;
    if (!this.current) this.current = controller.mode;
  },
  select(key) {
    Object.values(this.controllers).forEach(c => { c.state.region = key; });
    this.show();
  },
  activate(mode) {
    if (!this.controllers[mode]) return;
    this.current = mode;
    this.show();
  },
  show() {
    Object.values(this.controllers).forEach(c => {
      if (c.mode === this.current) c.show(); else c.hide();
    });
  }
};

function createController(mode, entry) {
  const state = { region: null, active: false };
  const container = () => document.getElementById(mode + 'Container');
  return {
    mode,
    state,
    show() {
      state.active = true;
      const el = container();
      if (el) el.classList.add('visible');
      if (state.region) entry(state.region);
    },
    hide() {
      state.active = false;
      const el = container();
      if (el) el.classList.remove('visible');
    }
  };
}
";

impl Shell<'_> {
    /// Document start through the open `<head>`
    pub fn head(&self) -> String {
        format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
             <title>{}</title>\n",
            html_escape(self.title)
        )
    }

    /// Style, end of head and the static body
    pub fn markup(&self) -> String {
        let mut out = String::from(STYLE);
        out.push_str("</head>\n<body>\n<div id=\"progress-bar\"></div>\n");
        out.push_str(&format!("<header><h1>{}</h1></header>\n", html_escape(self.title)));
        out.push_str("<section id=\"map-container\"></section>\n");
        out.push_str(
            "<section id=\"region-banner\" hidden>\n  <h2 id=\"region-title\"></h2>\n  <p id=\"region-subtitle\"></p>\n</section>\n",
        );
        out.push_str("<nav id=\"mode-toggle\">\n");
        for (index, view) in self.modes.iter().enumerate() {
            let active = if index == 0 { " active" } else { "" };
            out.push_str(&format!(
                "  <button class=\"mode-btn{active}\" data-mode=\"{mode}\" onclick=\"setMode({call})\">{label}</button>\n",
                mode = html_escape(view.mode),
                call = html_escape(&js_string(view.mode)),
                label = html_escape(view.label),
            ));
        }
        out.push_str("</nav>\n");
        for view in &self.modes {
            out.push_str(&format!(
                "<div id=\"{}Container\" class=\"mode-container\"></div>\n",
                html_escape(view.mode)
            ));
        }
        out
    }

    /// Entity table, display order, data aliases, dispatcher and controller factory
    pub fn shared_state(&self, table: &str, aliases: &[DataAlias]) -> String {
        let mut out = String::from(table);
        if !table.ends_with('\n') {
            out.push('\n');
        }
        let keys = self
            .sequence
            .iter()
            .map(|key| js_string(key))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!("const {} = [{keys}];\n", self.order));
        for alias in aliases {
            out.push_str(&format!("var {} = {};\n", alias.name, alias.value));
        }
        out.push('\n');
        out.push_str(DISPATCHER);
        out
    }

    /// `buildMap`, `selectRegion` and `setMode`
    pub fn host_routines(&self) -> String {
        let entity = self.entity;
        let label = self
            .label_field
            .map_or_else(|| "k".to_owned(), |field| format!("record.{field}"));

        let mut out = String::from("function buildMap() {\n");
        out.push_str("  const container = document.getElementById('map-container');\n");
        out.push_str("  if (!container) return;\n  container.innerHTML = '';\n");
        out.push_str(&format!("  {}.forEach(k => {{\n", self.order));
        out.push_str(&format!("    const record = {entity}[k];\n"));
        out.push_str("    if (!record) return;\n");
        out.push_str("    const tile = document.createElement('button');\n");
        out.push_str("    tile.type = 'button';\n    tile.className = 'region-tile';\n    tile.dataset.region = k;\n");
        if let Some(tiles) = self.tiles {
            out.push_str(&format!("    const shape = {tiles}[k];\n"));
            out.push_str(
                "    if (shape) {\n\
                 \x20     const ns = 'http://www.w3.org/2000/svg';\n\
                 \x20     const svg = document.createElementNS(ns, 'svg');\n\
                 \x20     svg.setAttribute('viewBox', shape.vb);\n\
                 \x20     svg.setAttribute('preserveAspectRatio', 'xMidYMid meet');\n\
                 \x20     const path = document.createElementNS(ns, 'path');\n\
                 \x20     path.setAttribute('d', shape.d);\n\
                 \x20     path.setAttribute('fill-rule', 'evenodd');\n\
                 \x20     svg.appendChild(path);\n\
                 \x20     tile.appendChild(svg);\n\
                 \x20   }\n",
            );
        }
        out.push_str("    const name = document.createElement('span');\n    name.className = 'tile-name';\n");
        out.push_str(&format!("    name.textContent = {label};\n"));
        out.push_str("    tile.appendChild(name);\n");
        out.push_str("    tile.addEventListener('click', () => selectRegion(k));\n");
        out.push_str("    container.appendChild(tile);\n  });\n}\n\n");

        out.push_str("function selectRegion(key) {\n");
        out.push_str("  document.querySelectorAll('.region-tile').forEach(t => {\n");
        out.push_str("    t.classList.toggle('active', t.dataset.region === key);\n  });\n");
        out.push_str(&format!("  const record = {entity}[key];\n"));
        out.push_str("  const banner = document.getElementById('region-banner');\n");
        out.push_str("  if (record && banner) {\n    banner.hidden = false;\n");
        if let Some(field) = self.label_field {
            out.push_str(&format!(
                "    document.getElementById('region-title').textContent = record.{field} + ' (' + key + ')';\n"
            ));
        }
        if let Some(field) = self.detail_field {
            out.push_str(&format!(
                "    document.getElementById('region-subtitle').textContent = record.{field};\n"
            ));
        }
        out.push_str("  }\n  modeDispatcher.select(key);\n}\n\n");

        out.push_str("function setMode(mode) {\n");
        out.push_str("  document.querySelectorAll('.mode-btn').forEach(b => {\n");
        out.push_str("    b.classList.toggle('active', b.dataset.mode === mode);\n  });\n");
        out.push_str("  modeDispatcher.activate(mode);\n}\n");
        out
    }

    /// Controller registration and page lifecycle hooks
    pub fn bootstrap(&self) -> String {
        let mut out = String::new();
        for view in &self.modes {
            out.push_str(&format!(
                "modeDispatcher.register(createController({}, (key) => {}(key)));\n",
                js_string(view.mode),
                view.entry
            ));
        }
        out.push_str(
            "\nwindow.addEventListener('scroll', () => {\n\
             \x20 const bar = document.getElementById('progress-bar');\n\
             \x20 const h = document.documentElement.scrollHeight - window.innerHeight;\n\
             \x20 if (bar) bar.style.width = (h > 0 ? (window.scrollY / h) * 100 : 0) + '%';\n\
             }, { passive: true });\n\n\
             document.addEventListener('DOMContentLoaded', () => {\n\
             \x20 buildMap();\n\
             });\n",
        );
        out
    }

    pub fn closing(&self) -> String {
        "</body>\n</html>\n".to_owned()
    }
}

fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
