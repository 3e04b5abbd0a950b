//! The plan → research → draft → review preset.

use std::sync::Arc;

use agent_kernel::{AgentResult, AgentRunner};
use agent_primitives::AgentSpec;

use crate::error::{WorkflowError, WorkflowResult};
use crate::orchestrator::{SequentialWorkflow, WorkflowBuilder};
use crate::stage::{PromptBuilder, Stage};

/// Context field written by the planner.
pub const PLAN: &str = "plan";
/// Context field written by the researcher.
pub const RESEARCH: &str = "research";
/// Context field written by the writer.
pub const DRAFT: &str = "draft";
/// Context field written by the reviewer; the pipeline's result.
pub const FINAL_OUTPUT: &str = "final_output";

const PLANNER_INSTRUCTIONS: &str = "You are a strategic planning agent.

Your role:
1. Analyze the user's request
2. Break it down into clear, actionable steps
3. Identify what information needs to be gathered
4. Create a structured plan

Output format:
- GOAL: One sentence summary
- STEPS: Numbered list of actions
- REQUIREMENTS: What information is needed
- SUCCESS CRITERIA: How to know when done
";

const RESEARCHER_INSTRUCTIONS: &str = "You are a thorough research agent.

Your role:
1. Gather relevant information for the task
2. Find best practices and examples
3. Identify potential challenges
4. Compile findings in a structured format

Output format:
- KEY FINDINGS: Bullet points of important information
- BEST PRACTICES: Recommended approaches
- CONSIDERATIONS: Things to keep in mind
- SOURCES: Where information came from (if applicable)
";

const WRITER_INSTRUCTIONS: &str = "You are a skilled content creation agent.

Your role:
1. Take the plan and research as input
2. Create well-structured, clear content
3. Ensure accuracy and completeness
4. Format appropriately for the audience

Guidelines:
- Be concise but thorough
- Use clear headings and structure
- Include code examples when relevant
- Maintain professional tone
";

const REVIEWER_INSTRUCTIONS: &str = "You are a quality assurance agent.

Your role:
1. Review the draft content
2. Check for accuracy and completeness
3. Suggest improvements
4. Provide final polished version

Output format:
- ASSESSMENT: Overall quality evaluation
- IMPROVEMENTS MADE: What was enhanced
- FINAL VERSION: The polished content
";

const PLAN_PROMPT: &str = "Create a plan for: {{request}}";
const RESEARCH_PROMPT: &str = "Based on this plan:\n{{plan}}\n\nResearch the following request:\n{{request}}";
const DRAFT_PROMPT: &str = "Using this plan:\n{{plan}}\n\nAnd this research:\n{{research}}\n\nCreate content for:\n{{request}}";
const REVIEW_PROMPT: &str = "Review and improve this draft:\n{{draft}}\n\nOriginal request was:\n{{request}}";

/// `(stage, persona, instructions, prompt)` for each preset stage.
const STAGES: [(&str, &str, &str, &str); 4] = [
    (PLAN, "Planner", PLANNER_INSTRUCTIONS, PLAN_PROMPT),
    (RESEARCH, "Researcher", RESEARCHER_INSTRUCTIONS, RESEARCH_PROMPT),
    (DRAFT, "Writer", WRITER_INSTRUCTIONS, DRAFT_PROMPT),
    (FINAL_OUTPUT, "Reviewer", REVIEWER_INSTRUCTIONS, REVIEW_PROMPT),
];

/// Assembles the four-stage research pipeline.
///
/// `factory` turns each persona (Planner, Researcher, Writer, Reviewer) into
/// a runner; callers typically build an [`agent_kernel::Agent`] around a
/// shared adapter. The returned builder can take observers before
/// [`WorkflowBuilder::build`].
///
/// # Errors
///
/// Returns [`WorkflowError::AgentSetup`] when `factory` fails for a persona.
pub fn research_pipeline<F>(mut factory: F) -> WorkflowResult<WorkflowBuilder>
where
    F: FnMut(AgentSpec) -> AgentResult<Arc<dyn AgentRunner>>,
{
    let mut builder = SequentialWorkflow::builder("research-pipeline");
    for (stage, persona, instructions, prompt) in STAGES {
        let spec = AgentSpec::builder(persona)
            .instructions(instructions)
            .build()
            .map_err(|err| WorkflowError::invalid_stage(err.to_string()))?;
        let agent = factory(spec).map_err(|source| WorkflowError::AgentSetup {
            agent: persona.to_owned(),
            source,
        })?;
        let prompt = PromptBuilder::template(prompt)
            .map_err(|err| WorkflowError::invalid_stage(err.to_string()))?;
        builder = builder.stage(Stage::new(stage, agent, prompt));
    }
    Ok(builder)
}
