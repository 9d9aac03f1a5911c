//! Prompt templates per analysis type.
//!
//! The SHA-256 of a template is part of every analysis key computed with it,
//! so any edit here invalidates the cached results of that analysis type.

use juris_abstraction::AnalysisType;

const ESSENTIAL: &str = "\
You are assisting a litigation team. Read the case documents below and return a JSON object with:
- \"summary\": a neutral summary of the case in at most five sentences;
- \"parties\": the parties and their procedural roles;
- \"status\": the current procedural stage;
- \"next_deadlines\": any dates or deadlines mentioned.
Do not speculate beyond the documents.";

const STRATEGIC: &str = "\
You are a senior litigation strategist. Analyse the case documents below and return a JSON object with:
- \"summary\": the core dispute;
- \"strengths\" and \"weaknesses\": arguments for the client, each citing the supporting document;
- \"risks\": procedural and substantive risks with a likelihood of low, medium or high;
- \"exposure\": the monetary amounts at stake;
- \"recommendations\": concrete next steps ordered by priority.";

const REPORT: &str = "\
You are preparing a formal case report for the client. Using the case documents below, return a JSON object with:
- \"title\";
- \"facts\": a chronological statement of facts;
- \"procedural_history\";
- \"legal_analysis\": the applicable law and how it bears on each claim;
- \"conclusion\".
Write in a formal register.";

/// Template for `analysis_type`.
pub const fn template_for(analysis_type: AnalysisType) -> &'static str {
    match analysis_type {
        AnalysisType::Essential => ESSENTIAL,
        AnalysisType::Strategic => STRATEGIC,
        AnalysisType::Report => REPORT,
    }
}
