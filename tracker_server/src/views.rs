//! Server-rendered pages: leptos components rendered to a string and wrapped
//! in a plain HTML shell.

use axum::response::Html;
use leptos::{IntoView, component, view};
use tracker_core::{
    Flash, ResourceRecord, StudyLogRecord, StudyLogResourceRecord, StudyLogSummary, TopicRecord,
    UserRecord,
};

// ---------------------------------------------------------------------------
// Shell
// ---------------------------------------------------------------------------

pub fn render_page(
    title: &str,
    user: Option<&UserRecord>,
    flashes: Vec<Flash>,
    body: &str,
) -> Html<String> {
    let flash_html = leptos::ssr::render_to_string(move || view! { <Flashes flashes=flashes /> });
    Html(page_shell(title, user, &flash_html, body))
}

fn page_shell(title: &str, user: Option<&UserRecord>, flashes: &str, body: &str) -> String {
    let nav_html = match user {
        Some(_) => r#"<a class="nav-link" href="/dashboard">Dashboard</a>
        <a class="nav-link" href="/topics/new">New topic</a>
        <form class="inline" method="post" action="/authentication/logout"><button class="link" type="submit">Logout</button></form>"#,
        None => r#"<a class="nav-link" href="/authentication/login">Login</a>
        <a class="nav-link" href="/authentication/register">Register</a>"#,
    };
    let title = escape_html(title);

    format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width,initial-scale=1" />
  <title>Knowledge Tracker | {title}</title>
  {STYLES}
</head>
<body>
  <header class="topbar">
    <a href="/" class="logo">Knowledge Tracker</a>
    <nav class="nav">
        {nav_html}
    </nav>
  </header>
  <main class="main">
    {flashes}
    {body}
  </main>
</body>
</html>"#
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Collapse line breaks so multi-line user text renders on one line.
pub fn one_line(s: &str) -> String {
    s.replace("\r\n", " ").replace(['\r', '\n'], " ")
}

fn when(dt: &chrono::DateTime<chrono::Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

// ---------------------------------------------------------------------------
// Shared components
// ---------------------------------------------------------------------------

#[component]
fn Flashes(flashes: Vec<Flash>) -> impl IntoView {
    view! {
        <div class="flashes">
            {flashes.into_iter().map(|f| {
                let cls = format!("flash {}", f.kind.as_str());
                view! { <div class=cls>{f.message}</div> }
            }).collect::<Vec<_>>()}
        </div>
    }
}

#[component]
fn EmptyState(message: &'static str) -> impl IntoView {
    view! {
        <div class="empty">
            <p>{message}</p>
        </div>
    }
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

#[component]
pub fn IndexPage(username: Option<String>) -> impl IntoView {
    view! {
        <div class="page-header">
            <h1>"Welcome to Knowledge tracker:"</h1>
            <p class="subtitle">"Track what you study, and the resources you studied with."</p>
        </div>
        {match username {
            Some(name) => view! {
                <p>"Signed in as " <strong>{name}</strong> ". "
                   <a href="/dashboard">"Go to your dashboard"</a></p>
            }.into_view(),
            None => view! {
                <p>
                    <a class="button" href="/authentication/login">"Login"</a>" "
                    <a class="button secondary" href="/authentication/register">"Create an account"</a>
                </p>
            }.into_view(),
        }}
    }
}

#[component]
pub fn RegisterPage() -> impl IntoView {
    view! {
        <div class="page-header"><h1>"Register"</h1></div>
        <form class="card" method="post" action="/authentication/register">
            <label>"Email" <input type="email" name="email" required=true /></label>
            <label>"Username" <input type="text" name="username" /></label>
            <label>"Password" <input type="password" name="password" required=true /></label>
            <button type="submit">"Create account"</button>
        </form>
        <p class="muted">"Already registered? " <a href="/authentication/login">"Login"</a></p>
    }
}

#[component]
pub fn LoginPage(google_enabled: bool) -> impl IntoView {
    view! {
        <div class="page-header"><h1>"Login"</h1></div>
        <form class="card" method="post" action="/authentication/login">
            <label>"Email" <input type="email" name="email" required=true /></label>
            <label>"Password" <input type="password" name="password" required=true /></label>
            <button type="submit">"Login"</button>
        </form>
        {google_enabled.then(|| view! {
            <p><a class="button secondary" href="/authentication/google">"Sign in with Google"</a></p>
        })}
        <p class="muted">"No account yet? " <a href="/authentication/register">"Register"</a></p>
    }
}

#[component]
pub fn DashboardPage(
    username: String,
    topics: Vec<TopicRecord>,
    logs: Vec<StudyLogSummary>,
) -> impl IntoView {
    view! {
        <div class="page-header">
            <h1>"Dashboard"</h1>
            <p class="subtitle">{format!("Hello, {username}.")}</p>
        </div>

        <section class="card">
            <div class="card-header">"Topics" <a class="button small" href="/topics/new">"New topic"</a></div>
            {if topics.is_empty() {
                view! { <EmptyState message="No topics yet. Create one to start logging." /> }.into_view()
            } else {
                view! {
                    <ul class="list">
                        {topics.into_iter().map(|t| view! {
                            <li>
                                <a href={format!("/topics/{}", t.id)}>{one_line(&t.title)}</a>
                                <span class="muted">" " {when(&t.created_at)}</span>
                            </li>
                        }).collect::<Vec<_>>()}
                    </ul>
                }.into_view()
            }}
        </section>

        <section class="card">
            <div class="card-header">"Recent study logs"</div>
            {if logs.is_empty() {
                view! { <EmptyState message="Nothing logged yet." /> }.into_view()
            } else {
                view! {
                    <table>
                        <thead><tr><th>"When"</th><th>"Topic"</th><th>"Minutes"</th><th>"Notes"</th></tr></thead>
                        <tbody>
                            {logs.into_iter().map(|s| view! {
                                <tr>
                                    <td><a href={format!("/study-logs/{}", s.log.id)}>{when(&s.log.created_at)}</a></td>
                                    <td>{s.topic_title.map(|t| one_line(&t)).unwrap_or_default()}</td>
                                    <td class="num">{s.log.duration_in_minutes}</td>
                                    <td>{s.log.notes.map(|n| one_line(&n)).unwrap_or_default()}</td>
                                </tr>
                            }).collect::<Vec<_>>()}
                        </tbody>
                    </table>
                }.into_view()
            }}
        </section>
    }
}

#[component]
pub fn NewTopicPage() -> impl IntoView {
    view! {
        <div class="page-header"><h1>"New topic"</h1></div>
        <form class="card" method="post" action="/topics">
            <label>"Title" <input type="text" name="title" /></label>
            <label>"Description" <textarea name="description" rows="4"></textarea></label>
            <button type="submit">"Create topic"</button>
        </form>
    }
}

#[component]
pub fn TopicPage(
    topic: TopicRecord,
    resources: Vec<ResourceRecord>,
    logs: Vec<StudyLogRecord>,
) -> impl IntoView {
    let id = topic.id;
    view! {
        <div class="page-header">
            <h1>{one_line(&topic.title)}</h1>
            <p class="subtitle">{one_line(topic.description.as_deref().unwrap_or_default())}</p>
            <form class="inline" method="post" action={format!("/topics/{id}/delete")}>
                <button class="danger small" type="submit">"Delete topic"</button>
            </form>
        </div>

        <section class="card">
            <div class="card-header">"Find resources"</div>
            <div class="search" data-topic={id.to_string()}>
                <select id="search-provider">
                    <option value="youtube">"YouTube"</option>
                    <option value="duck">"DuckDuckGo"</option>
                    <option value="wiki">"Wikipedia"</option>
                </select>
                <input id="search-q" type="text" placeholder="Search..." />
                <label class="check"><input id="search-save" type="checkbox" />" save results to topic"</label>
                <button id="search-go" type="button">"Search"</button>
                <button id="search-more" type="button" class="secondary">"More"</button>
            </div>
            <ul id="search-results" class="list"></ul>
        </section>

        <section class="card">
            <div class="card-header">"Log a study session"</div>
            <form id="log-form" method="post" action={format!("/topics/{id}/logs")}>
                <label>"Minutes" <input type="number" name="minutes" min="0" value="0" /></label>
                <label>"Notes" <textarea name="notes" rows="3"></textarea></label>
                <input type="hidden" name="resources" id="log-resources" value="[]" />
                <button type="submit">"Save log and resources to topic"</button>
                <button type="submit" class="secondary" formaction={format!("/topics/{id}/logs/saveMultiple")}>
                    "Save log with its own resources"
                </button>
            </form>
        </section>

        <section class="card">
            <div class="card-header">"Resources"</div>
            {if resources.is_empty() {
                view! { <EmptyState message="No resources saved for this topic." /> }.into_view()
            } else {
                view! {
                    <ul class="list">
                        {resources.into_iter().map(|r| {
                            let title = one_line(r.title.as_deref().unwrap_or_default());
                            let snippet = one_line(r.snippet.as_deref().unwrap_or_default());
                            view! {
                                <li>
                                    <span class="tag">{r.source.unwrap_or_default()}</span>" "
                                    <a href={r.url.unwrap_or_default()} target="_blank" rel="noopener">{title}</a>
                                    <div class="muted">{snippet}</div>
                                </li>
                            }
                        }).collect::<Vec<_>>()}
                    </ul>
                }.into_view()
            }}
        </section>

        <section class="card">
            <div class="card-header">"Study logs"</div>
            {if logs.is_empty() {
                view! { <EmptyState message="No study sessions logged for this topic." /> }.into_view()
            } else {
                view! {
                    <ul class="list">
                        {logs.into_iter().map(|l| view! {
                            <li>
                                <a href={format!("/study-logs/{}", l.id)}>{when(&l.created_at)}</a>
                                {format!(" · {} min ", l.duration_in_minutes)}
                                <span class="muted">{l.notes.map(|n| one_line(&n)).unwrap_or_default()}</span>
                            </li>
                        }).collect::<Vec<_>>()}
                    </ul>
                }.into_view()
            }}
        </section>

        <script inner_html=SEARCH_SCRIPT></script>
    }
}

#[component]
pub fn StudyLogPage(log: StudyLogRecord, resources: Vec<StudyLogResourceRecord>) -> impl IntoView {
    let id = log.id;
    view! {
        <div class="page-header">
            <h1>{format!("Study Log #{id}")}</h1>
            <p class="subtitle">
                {format!("{} minutes on {}", log.duration_in_minutes, when(&log.created_at))}
                " · " <a href={format!("/topics/{}", log.topic_id)}>"back to topic"</a>
            </p>
            <p>{log.notes.map(|n| one_line(&n)).unwrap_or_default()}</p>
            <form class="inline" method="post" action={format!("/study-logs/{id}/delete")}>
                <button class="danger small" type="submit">"Delete log"</button>
            </form>
        </div>

        <section class="card">
            <div class="card-header">"Resources"</div>
            {if resources.is_empty() {
                view! { <EmptyState message="No resources attached to this log." /> }.into_view()
            } else {
                view! {
                    <ul class="list">
                        {resources.into_iter().map(|r| view! {
                            <li>
                                <span class="tag">{r.source.unwrap_or_default()}</span>" "
                                <a href={r.url} target="_blank" rel="noopener">{one_line(&r.title)}</a>
                                <div class="muted">{r.snippet.map(|s| one_line(&s)).unwrap_or_default()}</div>
                            </li>
                        }).collect::<Vec<_>>()}
                    </ul>
                }.into_view()
            }}
        </section>

        <section class="card">
            <div class="card-header">"Add a resource"</div>
            <form method="post" action={format!("/study-logs/{id}/resources")}>
                <label>"Title" <input type="text" name="title" required=true /></label>
                <label>"URL" <input type="url" name="url" required=true /></label>
                <label>"Snippet" <input type="text" name="snippet" /></label>
                <label>"Source" <input type="text" name="source" value="manual" /></label>
                <button type="submit">"Add resource"</button>
            </form>
        </section>
    }
}

#[component]
pub fn NotFoundPage() -> impl IntoView {
    view! {
        <div class="page-header">
            <h1>"Not found"</h1>
            <p class="subtitle">"There is nothing at this address."</p>
        </div>
        <p><a href="/">"Back to the start page"</a></p>
    }
}

// ---------------------------------------------------------------------------
// Client script (search widget on the topic page)
// ---------------------------------------------------------------------------

const SEARCH_SCRIPT: &str = r#"
(function () {
  const box = document.querySelector('.search');
  if (!box) return;
  const topicId = box.dataset.topic;
  const list = document.getElementById('search-results');
  let page = 0, pageToken = null, lastQ = '';

  function row(r) {
    const li = document.createElement('li');
    const cb = document.createElement('input');
    cb.type = 'checkbox';
    cb.className = 'pick';
    cb.dataset.resource = JSON.stringify(r);
    const a = document.createElement('a');
    a.href = r.url; a.target = '_blank'; a.textContent = r.title;
    const s = document.createElement('div');
    s.className = 'muted'; s.textContent = r.snippet || '';
    li.append(cb, ' ', a, s);
    return li;
  }

  async function run(more) {
    const provider = document.getElementById('search-provider').value;
    const q = more ? lastQ : document.getElementById('search-q').value.trim();
    if (!q) return;
    if (!more) { page = 0; pageToken = null; list.innerHTML = ''; } else { page += 1; }
    lastQ = q;
    const params = new URLSearchParams({ q, page: String(page) });
    if (provider === 'youtube' && pageToken) params.set('pageToken', pageToken);
    if (document.getElementById('search-save').checked) params.set('topic_id', topicId);
    const resp = await fetch('/api/' + provider + '?' + params.toString());
    const body = await resp.json();
    if (!resp.ok) { list.append(Object.assign(document.createElement('li'), { textContent: body.error })); return; }
    pageToken = body.nextPageToken || null;
    body.results.forEach(r => list.append(row(r)));
  }

  document.getElementById('search-go').addEventListener('click', () => run(false));
  document.getElementById('search-more').addEventListener('click', () => run(true));
  document.getElementById('log-form').addEventListener('submit', () => {
    const picked = Array.from(document.querySelectorAll('.pick:checked')).map(cb => JSON.parse(cb.dataset.resource));
    document.getElementById('log-resources').value = JSON.stringify(picked);
  });
})();
"#;

// ---------------------------------------------------------------------------
// Styles (embedded CSS)
// ---------------------------------------------------------------------------

const STYLES: &str = r#"<style>
  :root {
    --bg: #f7f7f4;
    --surface: #ffffff;
    --border: #e2e2dc;
    --text: #1d1d1b;
    --muted: #6b6b66;
    --accent: #2f6f4f;
    --danger: #b3261e;
    --radius: 10px;
  }
  *, *::before, *::after { box-sizing: border-box; }
  body {
    margin: 0;
    color: var(--text);
    background: var(--bg);
    font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif;
    font-size: 15px;
    line-height: 1.5;
  }
  a { color: var(--accent); }
  .topbar { display: flex; justify-content: space-between; align-items: center; padding: 12px 24px; border-bottom: 1px solid var(--border); background: var(--surface); }
  .logo { font-weight: 700; text-decoration: none; color: var(--text); }
  .nav { display: flex; gap: 16px; align-items: center; }
  .nav-link { text-decoration: none; }
  .main { max-width: 880px; margin: 0 auto; padding: 24px; }
  .page-header h1 { margin: 0 0 4px; }
  .subtitle, .muted { color: var(--muted); }
  .card { background: var(--surface); border: 1px solid var(--border); border-radius: var(--radius); padding: 16px; margin: 16px 0; }
  .card-header { font-weight: 600; margin-bottom: 12px; display: flex; justify-content: space-between; align-items: center; }
  form.card label, section form label { display: block; margin-bottom: 10px; }
  input[type=text], input[type=email], input[type=password], input[type=url], input[type=number], textarea, select {
    display: block; width: 100%; padding: 8px; border: 1px solid var(--border); border-radius: 6px; font: inherit;
  }
  .search { display: flex; gap: 8px; align-items: center; flex-wrap: wrap; }
  .search input[type=text], .search select { display: inline-block; width: auto; }
  .check { display: inline-flex; gap: 4px; align-items: center; }
  button, .button { display: inline-block; padding: 8px 14px; border: 0; border-radius: 6px; background: var(--accent); color: #fff; font: inherit; cursor: pointer; text-decoration: none; }
  .secondary { background: #e8efe9; color: var(--accent); }
  .danger { background: var(--danger); }
  .small { padding: 4px 10px; font-size: 13px; }
  button.link { background: none; color: var(--accent); padding: 0; }
  form.inline { display: inline; }
  .list { list-style: none; padding: 0; margin: 0; }
  .list li { padding: 8px 0; border-bottom: 1px solid var(--border); }
  .list li:last-child { border-bottom: 0; }
  .tag { font-size: 12px; padding: 1px 6px; border-radius: 4px; background: #eef1ee; color: var(--muted); }
  table { width: 100%; border-collapse: collapse; }
  th, td { text-align: left; padding: 6px 8px; border-bottom: 1px solid var(--border); }
  td.num { text-align: right; }
  .flash { padding: 10px 14px; border-radius: 6px; margin-bottom: 8px; }
  .flash.success { background: #e6f4ea; color: #1e4620; }
  .flash.error { background: #fce8e6; color: #8c1d18; }
  .empty { color: var(--muted); font-style: italic; }
</style>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tracker_core::FlashKind;

    #[test]
    fn one_line_flattens_all_line_endings() {
        assert_eq!(one_line("a\r\nb\nc\rd"), "a b c d");
    }

    #[test]
    fn shell_escapes_title_and_renders_flashes() {
        let html = render_page(
            "<Rust>",
            None,
            vec![Flash {
                kind: FlashKind::Error,
                message: "Topic not found".into(),
            }],
            "<p>body</p>",
        )
        .0;
        assert!(html.contains("Knowledge Tracker | &lt;Rust&gt;"));
        assert!(html.contains("flash error"));
        assert!(html.contains("Topic not found"));
        assert!(html.contains("/authentication/login"));
    }

    #[test]
    fn flash_text_is_escaped() {
        let html = render_page(
            "x",
            None,
            vec![Flash {
                kind: FlashKind::Success,
                message: "<script>".into(),
            }],
            "",
        )
        .0;
        assert!(!html.contains("<script>"));
    }
}
