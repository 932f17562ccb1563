//! Server-side HTML for every screen, with all CSS inlined.

use std::collections::BTreeMap;

use crate::ml::analyzer::StudentReport;
use crate::progress::{rank_title, AttemptStats};
use crate::questions::{QuestionBank, CHOICE_LETTERS};
use crate::realm::{oracle_message, realms, Difficulty, Topic};
use crate::scores::ScoreRecord;
use crate::session::Session;

/// Escape a string for safe HTML insertion.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn button(action: &str, label: &str, class: &str) -> String {
    format!(
        "<form method=\"post\" action=\"{action}\" class=\"inline\"><button class=\"{class}\">{}</button></form>\n",
        html_escape(label)
    )
}

fn layout(title: &str, session: Option<&Session>, notice: Option<&str>, body: &str) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!(
        "<title>{} · ManabiFun English Adventure</title>\n",
        html_escape(title)
    ));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n</head>\n<body>\n<header>\n");
    html.push_str("<h1>🌸 ManabiFun English Adventure</h1>\n");

    if let Some((s, name)) = session.and_then(|s| s.player().map(|p| (s, p))) {
        let progress = s.progress();
        html.push_str(&format!(
            "<p class=\"status\">🧭 {} · Level {} {} · ✨ {} XP · 🔥 streak {} (best {}) · 🏆 {} realms mastered</p>\n",
            html_escape(name),
            progress.level(),
            rank_title(progress.level()),
            progress.total_xp,
            progress.quest_streak,
            progress.best_streak,
            progress.mastered_realms().len()
        ));
    }
    html.push_str("</header>\n<main>\n");
    if let Some(notice) = notice {
        html.push_str(&format!("<p class=\"notice\">{}</p>\n", html_escape(notice)));
    }
    html.push_str(body);
    html.push_str("</main>\n</body>\n</html>\n");
    html
}

pub fn introduction(notice: Option<&str>) -> String {
    let body = "<section class=\"card\">\n\
        <h2>Welcome, traveller!</h2>\n\
        <p>Five realms of the English language await. Answer the mentors' riddles, earn XP and master every chapter.</p>\n\
        <form method=\"post\" action=\"/player\">\n\
        <label for=\"name\">What shall we call you, explorer?</label>\n\
        <input id=\"name\" name=\"name\" maxlength=\"40\" required autofocus>\n\
        <button class=\"primary\">Begin the adventure</button>\n\
        </form>\n</section>\n";
    layout("Welcome", None, notice, body)
}

pub fn realm_selection(session: &Session, bank: &QuestionBank, notice: Option<&str>) -> String {
    let counts = bank.topic_counts();
    let mut body = String::from("<h2>Choose your realm</h2>\n<div class=\"grid\">\n");
    for realm in realms() {
        let mastered = if session.progress().is_realm_mastered(realm.topic) {
            "<span class=\"badge\">👑 Mastered</span>"
        } else {
            ""
        };
        body.push_str(&format!(
            "<section class=\"card\">\n<h3>{} {} {mastered}</h3>\n<p>{}</p>\n<p class=\"meta\">{} scrolls of questions</p>\n",
            realm.emoji,
            html_escape(realm.name),
            html_escape(realm.description),
            counts.get(&realm.topic).copied().unwrap_or(0)
        ));
        body.push_str(&button(&format!("/realm/{}", realm.topic), "Enter realm", "primary"));
        body.push_str("</section>\n");
    }
    body.push_str("</div>\n<nav>\n");
    body.push_str(&button("/journal", "📖 Adventure journal", ""));
    body.push_str(&button("/reset", "🔄 New adventure", "quiet"));
    body.push_str("</nav>\n");
    layout("Realms", Some(session), notice, &body)
}

pub fn chapter_selection(session: &Session, bank: &QuestionBank, topic: Topic, notice: Option<&str>) -> String {
    let realm = topic.realm();
    let mut body = format!(
        "<h2>{} {}</h2>\n<p class=\"welcome\">{}</p>\n<p class=\"meta\">Your mentor: {}</p>\n<div class=\"grid\">\n",
        realm.emoji,
        html_escape(realm.name),
        html_escape(realm.welcome),
        html_escape(realm.mentor)
    );
    for difficulty in Difficulty::ALL {
        let available = bank.chapter_size(topic, difficulty);
        let stats = session.progress().chapter(topic, difficulty);
        let status = if stats.passed {
            "✅ Passed".to_string()
        } else if stats.attempts > 0 {
            format!("{} attempts so far", stats.attempts)
        } else {
            "Not yet explored".to_string()
        };
        body.push_str(&format!(
            "<section class=\"card\">\n<h3>{} {}</h3>\n<p class=\"meta\">{} · {available} questions · {status}</p>\n",
            difficulty.badge(),
            html_escape(realm.chapter_name(difficulty)),
            difficulty
        ));
        if available > 0 {
            body.push_str(&button(&format!("/chapter/{difficulty}"), "Start chapter", "primary"));
        } else {
            body.push_str("<p class=\"meta\">The scrolls for this chapter are still being written.</p>\n");
        }
        body.push_str("</section>\n");
    }
    body.push_str("</div>\n<nav>\n");
    body.push_str(&button("/leave-realm", "← Back to realms", ""));
    body.push_str("</nav>\n");
    layout(realm.name, Some(session), notice, &body)
}

pub fn question(session: &Session, notice: Option<&str>) -> String {
    let Some(run) = session.run() else {
        return layout("Chapter", Some(session), notice, "<p>No chapter in progress.</p>\n");
    };
    let Some(question) = run.current() else {
        return layout("Chapter", Some(session), notice, "<p>This chapter has no questions.</p>\n");
    };
    let realm = run.topic.realm();
    let mut body = String::new();
    if run.position() == 0 && run.feedback().is_none() {
        body.push_str(&format!("<p class=\"story\">{}</p>\n", html_escape(&run.intro)));
    }
    body.push_str(&format!(
        "<p class=\"meta\">{} {} · {} · Question {} of {} · {} correct so far</p>\n",
        realm.emoji,
        html_escape(realm.chapter_name(run.difficulty)),
        run.difficulty,
        run.position() + 1,
        run.len(),
        run.correct_count()
    ));
    body.push_str(&format!(
        "<section class=\"card\">\n<h2>{}</h2>\n",
        html_escape(&question.prompt)
    ));

    match run.feedback() {
        None => {
            body.push_str("<div class=\"options\">\n");
            for (i, option) in question.options.iter().enumerate() {
                body.push_str(&format!(
                    "<form method=\"post\" action=\"/answer\" class=\"inline\"><input type=\"hidden\" name=\"choice\" value=\"{i}\"><button class=\"option\">{}. {}</button></form>\n",
                    CHOICE_LETTERS[i],
                    html_escape(option)
                ));
            }
            body.push_str("</div>\n");
        }
        Some(feedback) => {
            body.push_str("<ul class=\"options\">\n");
            for (i, option) in question.options.iter().enumerate() {
                let class = if i == feedback.correct_index {
                    "right"
                } else if i == feedback.chosen {
                    "wrong"
                } else {
                    ""
                };
                body.push_str(&format!(
                    "<li class=\"{class}\">{}. {}</li>\n",
                    CHOICE_LETTERS[i],
                    html_escape(option)
                ));
            }
            body.push_str("</ul>\n");
            if feedback.correct {
                body.push_str(&format!(
                    "<p class=\"right\">🎉 Correct! +{} XP</p>\n",
                    feedback.xp_earned
                ));
            } else {
                body.push_str(&format!(
                    "<p class=\"wrong\">💫 Not quite. The answer was {}. {}</p>\n",
                    question.correct_letter(),
                    html_escape(question.correct_answer())
                ));
            }
            let label = if run.position() + 1 >= run.len() {
                "Finish chapter 🏁"
            } else {
                "Next question →"
            };
            body.push_str(&button("/next", label, "primary"));
        }
    }
    body.push_str("</section>\n<nav>\n");
    body.push_str(&button("/leave-chapter", "Leave chapter", "quiet"));
    body.push_str("</nav>\n");
    layout("Chapter", Some(session), notice, &body)
}

pub fn chapter_results(session: &Session, notice: Option<&str>) -> String {
    let (Some(outcome), Some(run)) = (session.last_outcome(), session.run()) else {
        return layout("Results", Some(session), notice, "<p>No results yet.</p>\n");
    };
    let realm = outcome.topic.realm();
    let mut body = format!(
        "<h2>{} {} complete</h2>\n<section class=\"card\">\n<p class=\"score\">{} / {} correct · {:.1}%</p>\n",
        realm.emoji,
        html_escape(realm.chapter_name(outcome.difficulty)),
        outcome.correct_answers,
        outcome.total_questions,
        outcome.accuracy_percent
    );
    if outcome.passed {
        body.push_str("<p class=\"right\">✅ Chapter passed!</p>\n");
    } else {
        body.push_str(&format!(
            "<p class=\"wrong\">Chapter not passed yet. {:.0}% unlocks it.</p>\n",
            session.pass_threshold()
        ));
    }
    if outcome.realm_mastered {
        body.push_str(&format!(
            "<p class=\"badge\">👑 You have mastered {}!</p>\n",
            html_escape(realm.name)
        ));
    }
    body.push_str(&format!("<p>✨ {} XP earned this run</p>\n", outcome.xp_earned));
    if let Some(message) = session.message() {
        body.push_str(&format!("<p class=\"story\">{}</p>\n", html_escape(message)));
    }
    body.push_str("<details>\n<summary>Review your answers</summary>\n<ol>\n");
    for answer in run.answers() {
        body.push_str(&format!(
            "<li class=\"{}\">{}</li>\n",
            if answer.correct { "right" } else { "wrong" },
            html_escape(&answer.prompt)
        ));
    }
    body.push_str("</ol>\n</details>\n</section>\n<nav>\n");
    body.push_str(&button("/retry", "🔁 Try again", "primary"));
    body.push_str(&button("/leave-chapter", "← Back to chapters", ""));
    body.push_str("</nav>\n");
    layout("Results", Some(session), notice, &body)
}

/// Horizontal bar chart of accuracy per realm.
fn accuracy_chart(breakdown: &BTreeMap<Topic, AttemptStats>) -> String {
    let bar_height = 26;
    let max_width = 360;
    let padding = 10;
    let label_width = 190;
    let total_height = breakdown.len() * (bar_height + padding) + padding;

    let mut svg = format!(
        "<svg width=\"{}\" height=\"{}\" xmlns=\"http://www.w3.org/2000/svg\" role=\"img\" aria-label=\"Accuracy per realm\">\n",
        label_width + max_width + 70,
        total_height
    );
    for (i, (topic, stats)) in breakdown.iter().enumerate() {
        let y = i * (bar_height + padding) + padding;
        let score = stats.accuracy();
        let width = (score * max_width as f64) as usize;
        let color = if stats.total_questions == 0 {
            "#9ca3af"
        } else if score >= 0.89 {
            "#22c55e"
        } else if score >= 0.7 {
            "#eab308"
        } else {
            "#ef4444"
        };
        let realm = topic.realm();
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"14\" fill=\"currentColor\" text-anchor=\"end\" dominant-baseline=\"middle\">{} {}</text>\n",
            label_width - 10,
            y + bar_height / 2,
            realm.emoji,
            html_escape(realm.name)
        ));
        svg.push_str(&format!(
            "  <rect x=\"{label_width}\" y=\"{y}\" width=\"{width}\" height=\"{bar_height}\" fill=\"{color}\" rx=\"4\"/>\n"
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"12\" fill=\"currentColor\" dominant-baseline=\"middle\">{:.1}%</text>\n",
            label_width + width + 8,
            y + bar_height / 2,
            score * 100.0
        ));
    }
    svg.push_str("</svg>\n");
    svg
}

pub fn journal(
    session: &Session,
    report: &StudentReport,
    records: &[ScoreRecord],
    breakdown: &BTreeMap<Topic, AttemptStats>,
    notice: Option<&str>,
) -> String {
    let summary = &report.summary;
    let analysis = &report.analysis;
    let mut body = String::from("<h2>📖 Adventure journal</h2>\n");

    body.push_str(&format!(
        "<section class=\"card stats\">\n<div><strong>{}</strong><span>chapters</span></div>\n<div><strong>{:.1}%</strong><span>accuracy</span></div>\n<div><strong>{}</strong><span>questions</span></div>\n<div><strong>{}</strong><span>realms mastered</span></div>\n<div><strong>{:.0}%</strong><span>consistency</span></div>\n</section>\n",
        summary.total_chapters,
        summary.overall_accuracy,
        summary.total_questions,
        summary.realms_mastered,
        summary.consistency_score
    ));

    if records.is_empty() {
        body.push_str("<section class=\"card\"><p>Your journal is empty. Complete a chapter and the oracle will read your path.</p></section>\n");
    } else {
        body.push_str("<section class=\"card\">\n<h3>Realm accuracy</h3>\n");
        body.push_str(&accuracy_chart(breakdown));
        let overall = breakdown
            .values()
            .fold(AttemptStats::default(), |acc, stats| acc.merge(stats));
        body.push_str(&format!(
            "<p class=\"meta\">Across all realms: {} correct, {} missed over {} runs.</p>\n",
            overall.correct_answers, overall.incorrect_answers, overall.total_attempts
        ));
        body.push_str("</section>\n");

        body.push_str("<section class=\"card\">\n<h3>🔮 The oracle speaks</h3>\n");
        if analysis.is_default {
            body.push_str("<p class=\"meta\">The oracle's crystal is still clouded. Keep exploring and it will soon reveal your path.</p>\n");
        } else {
            body.push_str(&format!(
                "<p class=\"story\">{}</p>\n",
                html_escape(&oracle_message(
                    &report.student_name,
                    analysis.primary_weakness,
                    analysis.confidence
                ))
            ));
        }
        body.push_str(&format!(
            "<p>Learning trajectory: <strong>{}</strong> ({:.0}% chance of improving)</p>\n",
            analysis.learning_trajectory,
            analysis.improvement_probability * 100.0
        ));
        body.push_str("<table>\n<thead><tr><th>Realm</th><th>Current score</th><th>Weakness probability</th><th></th></tr></thead>\n<tbody>\n");
        for row in &analysis.weakness_breakdown {
            let realm = row.topic.realm();
            body.push_str(&format!(
                "<tr><td>{} {}</td><td>{:.0}%</td><td>{:.0}%</td><td>{}</td></tr>\n",
                realm.emoji,
                html_escape(realm.name),
                row.current_score * 100.0,
                row.weakness_probability * 100.0,
                if row.needs_attention { "⚠️ needs attention" } else { "" }
            ));
        }
        body.push_str("</tbody></table>\n</section>\n");
    }

    if !report.recommendations.is_empty() {
        body.push_str("<section class=\"card\">\n<h3>Recommendations</h3>\n<ul>\n");
        for rec in &report.recommendations {
            body.push_str(&format!(
                "<li><span class=\"priority\">{:?}</span> {} <span class=\"meta\">({}; {})</span></li>\n",
                rec.priority,
                html_escape(&rec.action),
                html_escape(&rec.reason),
                html_escape(&rec.timeline)
            ));
        }
        body.push_str("</ul>\n</section>\n");
    }

    body.push_str("<section class=\"card\">\n<h3>Insights</h3>\n<ul>\n");
    for insight in &report.insights {
        body.push_str(&format!("<li>{}</li>\n", html_escape(insight)));
    }
    body.push_str("</ul>\n</section>\n");

    if !records.is_empty() {
        body.push_str("<section class=\"card\">\n<h3>Recent adventures</h3>\n<table>\n<thead><tr><th>When</th><th>Realm</th><th>Chapter</th><th>Score</th><th>XP</th></tr></thead>\n<tbody>\n");
        for record in records.iter().rev().take(10) {
            body.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}/{} ({:.0}%)</td><td>{}</td></tr>\n",
                record.timestamp.format("%Y-%m-%d %H:%M"),
                html_escape(record.topic.realm().name),
                record.difficulty,
                record.correct_answers,
                record.total_questions,
                record.score,
                record.xp_earned
            ));
        }
        body.push_str("</tbody></table>\n</section>\n");
    }

    body.push_str("<nav>\n");
    body.push_str(&button("/journal", "← Back to realms", ""));
    body.push_str("</nav>\n");
    layout("Journal", Some(session), notice, &body)
}

/// Shown instead of the game when the question bank cannot be used.
pub fn unavailable(problem: &str) -> String {
    let body = format!(
        "<section class=\"card\">\n<h2>📜 The scrolls are missing</h2>\n<p>The ancient library could not open its question scrolls, so the adventure cannot begin just yet.</p>\n<p class=\"meta\">{}</p>\n<p>Ask your guide to place a question bank at the configured path, or import one with <code>manabi import</code>.</p>\n</section>\n",
        html_escape(problem)
    );
    layout("Scrolls missing", None, None, &body)
}

pub fn error_page(status: u16, message: &str) -> String {
    let body = format!(
        "<section class=\"card\">\n<h2>🌀 Something went astray ({status})</h2>\n<p>{}</p>\n<p><a href=\"/\">Return to the adventure</a></p>\n</section>\n",
        html_escape(message)
    );
    layout("Error", None, None, &body)
}

const CSS: &str = r#"
:root { --bg: #fdf6ec; --fg: #2d2a32; --card: #fff; --border: #eadbc8; --accent: #7c3aed; --right: #dcfce7; --wrong: #fde2e2; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #17151c; --fg: #f4f0fa; --card: #221f29; --border: #3a3545; --right: #064e3b; --wrong: #7f1d1d; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 1.5rem 2rem; background: var(--bg); color: var(--fg); }
header h1 { margin: 0 0 .25rem; }
.status, .meta { color: #8a8195; }
.notice { background: var(--wrong); padding: .75rem 1rem; border-radius: 8px; }
.grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(260px, 1fr)); gap: 1rem; }
.card { background: var(--card); border: 1px solid var(--border); border-radius: 12px; padding: 1rem 1.25rem; margin: 1rem 0; }
.story { font-style: italic; }
.stats { display: flex; flex-wrap: wrap; gap: 2rem; }
.stats div { display: flex; flex-direction: column; }
.stats strong { font-size: 1.6rem; }
.badge { color: #b45309; font-weight: bold; }
.priority { font-weight: bold; color: var(--accent); }
.inline { display: inline-block; margin: .25rem .5rem .25rem 0; }
.options { list-style: none; padding: 0; }
.options li { padding: .5rem .75rem; border-radius: 8px; margin: .25rem 0; }
button { font: inherit; padding: .5rem 1rem; border-radius: 8px; border: 1px solid var(--border); background: var(--card); color: var(--fg); cursor: pointer; }
button.primary { background: var(--accent); color: #fff; border-color: var(--accent); }
button.option { min-width: 240px; text-align: left; }
button.quiet { opacity: .7; }
input { font: inherit; padding: .5rem; border-radius: 8px; border: 1px solid var(--border); margin: .5rem 0; display: block; }
.right { background: var(--right); }
.wrong { background: var(--wrong); }
table { border-collapse: collapse; width: 100%; margin: .5rem 0; }
th, td { border-bottom: 1px solid var(--border); padding: .4rem .75rem; text-align: left; }
svg { margin: .5rem 0; max-width: 100%; }
"#;
