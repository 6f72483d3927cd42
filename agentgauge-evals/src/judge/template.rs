// Copyright 2025 Agentgauge Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Minimal prompt template engine
//!
//! A deliberately non-Turing substitution processor: literal field
//! replacement, presence-conditional sections, and a single dimension
//! range. No escaping, no nesting, no expression language. Sections must
//! be sequential, not nested.

use super::JudgeDimension;

/// Default judge prompt; placeholders match the template engine below
pub const DEFAULT_JUDGE_PROMPT: &str = r#"You are an expert evaluator assessing the quality of an AI-generated response.

## Input
{{.Prompt}}

{{if .Reference}}## Reference Material
{{.Reference}}

{{end}}{{if .Expected}}## Expected Response
{{.Expected}}

{{end}}## Response to Evaluate
{{.Response}}

## Evaluation Dimensions
{{range .Dimensions}}{{end}}

Score each dimension from {{.ScoreMin}} to {{.ScoreMax}}.

Respond with a single JSON object of this shape:
{
  "dimensions": {"<dimension name>": {"score": <number>, "reasoning": "<why>"}},
  "overall_score": <number>,
  "reasoning": "<overall assessment>",
  "confidence": <number between 0 and 1>
}
"#;

/// Values available to a template
pub(crate) struct TemplateContext<'a> {
    pub prompt: &'a str,
    pub response: &'a str,
    pub reference: Option<&'a str>,
    pub expected: Option<&'a str>,
    pub score_min: f64,
    pub score_max: f64,
    pub dimensions: &'a [JudgeDimension],
}

/// Render a template against its context
pub(crate) fn render(template: &str, ctx: &TemplateContext<'_>) -> String {
    let keep_reference = ctx.reference.is_some_and(|v| !v.is_empty());
    let keep_expected = ctx.expected.is_some_and(|v| !v.is_empty());

    let out = apply_section(template, "{{if .Reference}}", keep_reference);
    let out = apply_section(&out, "{{if .Expected}}", keep_expected);
    let out = apply_range(&out, ctx.dimensions);

    out.replace("{{.Prompt}}", ctx.prompt)
        .replace("{{.Response}}", ctx.response)
        .replace("{{.Reference}}", ctx.reference.unwrap_or(""))
        .replace("{{.Expected}}", ctx.expected.unwrap_or(""))
        .replace("{{.ScoreMin}}", &format_number(ctx.score_min))
        .replace("{{.ScoreMax}}", &format_number(ctx.score_max))
}

/// Keep or delete every `open … {{end}}` section
fn apply_section(input: &str, open: &str, keep: bool) -> String {
    const END: &str = "{{end}}";

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find(open) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + open.len()..];
        match after_open.find(END) {
            Some(end) => {
                if keep {
                    out.push_str(&after_open[..end]);
                }
                rest = &after_open[end + END.len()..];
            }
            None => {
                // Unterminated section passes through untouched.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Replace the dimensions range with one bullet line per dimension
fn apply_range(input: &str, dimensions: &[JudgeDimension]) -> String {
    const OPEN: &str = "{{range .Dimensions}}";
    const END: &str = "{{end}}";

    let Some(start) = input.find(OPEN) else {
        return input.to_string();
    };
    let after_open = &input[start + OPEN.len()..];
    let Some(end) = after_open.find(END) else {
        return input.to_string();
    };

    let rendered = dimensions
        .iter()
        .map(|d| format!("- **{}**: {} (Weight: {:.2})", d.name, d.description, d.weight))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}{}{}",
        &input[..start],
        rendered,
        &after_open[end + END.len()..]
    )
}

/// Integral bounds render without a decimal point (0, not 0.0)
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> Vec<JudgeDimension> {
        vec![
            JudgeDimension::new("relevance", "Does it address the question?", 0.3),
            JudgeDimension::new("accuracy", "Is it factually correct?", 0.3),
        ]
    }

    fn ctx<'a>(
        reference: Option<&'a str>,
        expected: Option<&'a str>,
        dimensions: &'a [JudgeDimension],
    ) -> TemplateContext<'a> {
        TemplateContext {
            prompt: "What is 2+2?",
            response: "4",
            reference,
            expected,
            score_min: 0.0,
            score_max: 10.0,
            dimensions,
        }
    }

    #[test]
    fn test_literal_replacement() {
        let dimensions = dims();
        let out = render(
            "Q: {{.Prompt}} A: {{.Response}} ({{.ScoreMin}}-{{.ScoreMax}})",
            &ctx(None, None, &dimensions),
        );
        assert_eq!(out, "Q: What is 2+2? A: 4 (0-10)");
    }

    #[test]
    fn test_conditional_section_dropped_when_absent() {
        let dimensions = dims();
        let out = render(
            "A{{if .Reference}} ref={{.Reference}}{{end}}B",
            &ctx(None, None, &dimensions),
        );
        assert_eq!(out, "AB");

        // Empty string counts as absent.
        let out = render(
            "A{{if .Reference}} ref={{.Reference}}{{end}}B",
            &ctx(Some(""), None, &dimensions),
        );
        assert_eq!(out, "AB");
    }

    #[test]
    fn test_conditional_section_kept_when_present() {
        let dimensions = dims();
        let out = render(
            "A{{if .Reference}} ref={{.Reference}}{{end}}B",
            &ctx(Some("the docs"), None, &dimensions),
        );
        assert_eq!(out, "A ref=the docsB");
    }

    #[test]
    fn test_independent_conditionals() {
        let dimensions = dims();
        let template = "{{if .Reference}}R{{end}}{{if .Expected}}E{{end}}";
        assert_eq!(render(template, &ctx(None, Some("x"), &dimensions)), "E");
        assert_eq!(render(template, &ctx(Some("x"), None, &dimensions)), "R");
        assert_eq!(render(template, &ctx(Some("x"), Some("y"), &dimensions)), "RE");
    }

    #[test]
    fn test_range_renders_dimension_lines() {
        let dimensions = dims();
        let out = render(
            "Dims:\n{{range .Dimensions}}{{end}}",
            &ctx(None, None, &dimensions),
        );
        assert_eq!(
            out,
            "Dims:\n- **relevance**: Does it address the question? (Weight: 0.30)\n- **accuracy**: Is it factually correct? (Weight: 0.30)"
        );
    }

    #[test]
    fn test_default_prompt_renders_without_leftover_markers() {
        let dimensions = dims();
        let out = render(
            DEFAULT_JUDGE_PROMPT,
            &ctx(None, Some("four"), &dimensions),
        );

        assert!(!out.contains("{{"));
        assert!(!out.contains("}}"));
        assert!(out.contains("## Expected Response\nfour"));
        assert!(!out.contains("## Reference Material"));
        assert!(out.contains("Score each dimension from 0 to 10."));
        assert!(out.contains("- **relevance**:"));
    }

    #[test]
    fn test_fractional_bounds_keep_decimals() {
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(10.0), "10");
    }
}
