//! Email templates.

use crate::job::AnalysisEmailPayload;
use serde_json::Value;
use std::fmt::Write;

const STYLE: &str = "body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px; }
.header { background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); color: white; padding: 30px; border-radius: 10px 10px 0 0; text-align: center; }
.content { background: #f8f9fa; padding: 30px; border-radius: 0 0 10px 10px; }
.analysis-section { background: white; padding: 20px; margin: 20px 0; border-radius: 8px; border-left: 4px solid #667eea; }
.score { font-size: 24px; font-weight: bold; color: #667eea; }
.cta-button { display: inline-block; background: #667eea; color: white; padding: 12px 24px; text-decoration: none; border-radius: 6px; margin: 20px 0; }
.footer { text-align: center; margin-top: 30px; color: #666; font-size: 14px; }";

/// A rendered email body and subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

/// Renders the transactional emails.
#[derive(Debug, Clone)]
pub struct EmailTemplates {
    public_app_url: String,
}

impl EmailTemplates {
    /// `public_app_url` is the call-to-action link target.
    pub fn new(public_app_url: impl Into<String>) -> Self {
        Self {
            public_app_url: public_app_url.into(),
        }
    }

    /// Welcome email for a new user.
    pub fn welcome(&self, name: &str) -> RenderedEmail {
        let body = format!(
            r#"<div class="header">
<h1>Welcome to Resume2Path!</h1>
<p>Hi {name}, let's transform your career together</p>
</div>
<div class="content">
<h2>Get Started</h2>
<p>Upload your resume and get AI-powered career guidance.</p>
<div style="text-align: center;"><a href="{url}" class="cta-button">Upload Your Resume</a></div>
<h3>What you can do:</h3>
<ul>
<li>Upload PDF or DOCX resumes</li>
<li>Get AI analysis with specific role targeting</li>
<li>Chat with our AI career assistant</li>
<li>Track your progress in the dashboard</li>
</ul>
</div>
<div class="footer"><p>Powered by Resume2Path AI</p></div>"#,
            name = escape_html(name),
            url = escape_html(&self.public_app_url),
        );

        RenderedEmail {
            subject: "Welcome to Resume2Path!".to_string(),
            html: page("Welcome to Resume2Path", &body),
        }
    }

    /// Analysis results email.
    pub fn analysis(&self, payload: &AnalysisEmailPayload) -> RenderedEmail {
        let result = &payload.analysis_result;
        let role = escape_html(&payload.target_role);

        let body = format!(
            r#"<div class="header">
<h1>Resume Analysis Complete!</h1>
<p>Hi {name}, your {role} resume analysis is ready</p>
</div>
<div class="content">
<h2>Analysis Summary</h2>
<p><strong>File:</strong> {file}</p>
<p><strong>Target Role:</strong> {role}</p>
<div class="analysis-section"><h3>Overall Score</h3><div class="score">{score}/10</div></div>
<div class="analysis-section"><h3>Strengths</h3><ul>{strengths}</ul></div>
<div class="analysis-section"><h3>Areas for Improvement</h3><ul>{improvements}</ul></div>
<div class="analysis-section"><h3>Key Recommendations</h3><ul>{recommendations}</ul></div>
<div style="text-align: center;"><a href="{url}" class="cta-button">View Full Analysis &amp; Chat with AI</a></div>
</div>
<div class="footer">
<p>Powered by Resume2Path AI</p>
<p>This email was sent because you uploaded a resume for analysis.</p>
</div>"#,
            name = escape_html(&payload.name),
            role = role,
            file = escape_html(&payload.file_name),
            score = overall_score(result),
            strengths = list_items(result.get("strengths")),
            improvements = list_items(result.get("improvements")),
            recommendations = list_items(result.get("recommendations")),
            url = escape_html(&self.public_app_url),
        );

        RenderedEmail {
            subject: format!("Your {} Resume Analysis is Ready!", payload.target_role),
            html: page("Resume Analysis Results", &body),
        }
    }
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <title>{title}</title>\n<style>\n{STYLE}\n</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n"
    )
}

/// `N/A` for missing, null, zero, empty or false scores.
fn overall_score(result: &Value) -> String {
    match result.get("overallScore") {
        Some(Value::Number(n)) if n.as_f64().is_some_and(|v| v != 0.0) => n.to_string(),
        Some(Value::String(s)) if !s.is_empty() => escape_html(s),
        Some(Value::Bool(true)) => "true".to_string(),
        _ => "N/A".to_string(),
    }
}

fn list_items(items: Option<&Value>) -> String {
    let Some(Value::Array(items)) = items else {
        return String::new();
    };

    let mut out = String::new();
    for item in items {
        let text = match item {
            Value::String(s) => escape_html(s),
            other => escape_html(&other.to_string()),
        };
        let _ = write!(out, "<li>{}</li>", text);
    }
    out
}

/// Escapes text for HTML element and attribute content.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(result: Value) -> AnalysisEmailPayload {
        AnalysisEmailPayload {
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
            analysis_result: result,
            file_name: "resume.pdf".to_string(),
            target_role: "Backend Engineer".to_string(),
        }
    }

    fn templates() -> EmailTemplates {
        EmailTemplates::new("https://resume2path.vercel.app")
    }

    #[test]
    fn test_welcome_email() {
        let email = templates().welcome("Ada");
        assert_eq!(email.subject, "Welcome to Resume2Path!");
        assert!(email.html.contains("Hi Ada,"));
        assert!(email.html.contains("href=\"https://resume2path.vercel.app\""));
    }

    #[test]
    fn test_analysis_email_sections() {
        let email = templates().analysis(&payload(json!({
            "overallScore": 8,
            "strengths": ["Clear impact statements"],
            "improvements": ["Add metrics"],
            "recommendations": ["Lead with Rust projects"]
        })));

        assert_eq!(email.subject, "Your Backend Engineer Resume Analysis is Ready!");
        assert!(email.html.contains("8/10"));
        assert!(email.html.contains("<li>Clear impact statements</li>"));
        assert!(email.html.contains("<li>Add metrics</li>"));
        assert!(email.html.contains("<li>Lead with Rust projects</li>"));
        assert!(email.html.contains("resume.pdf"));
    }

    #[test]
    fn test_missing_score_is_not_available() {
        for result in [json!({}), json!({"overallScore": 0}), json!({"overallScore": null})] {
            let email = templates().analysis(&payload(result));
            assert!(email.html.contains("N/A/10"));
        }
    }

    #[test]
    fn test_missing_lists_render_empty() {
        let email = templates().analysis(&payload(json!({"overallScore": 6.5})));
        assert!(email.html.contains("6.5/10"));
        assert!(email.html.contains("<h3>Strengths</h3><ul></ul>"));
    }

    #[test]
    fn test_interpolated_text_is_escaped() {
        let mut p = payload(json!({"strengths": ["<script>alert(1)</script>"]}));
        p.name = "Ada & \"Bob\"".to_string();

        let email = templates().analysis(&p);
        assert!(email.html.contains("<li>&lt;script&gt;alert(1)&lt;/script&gt;</li>"));
        assert!(email.html.contains("Hi Ada &amp; &quot;Bob&quot;,"));
        assert!(!email.html.contains("<script>"));
    }
}
