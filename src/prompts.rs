// Built-in prompt texts and the sample analysis fed to both workflows.

/// Single-shot template used by `taskforge run`: one reply carries both the
/// task definition and the generated function.
pub const TASK_AND_FUNCTION_TEMPLATE: &str = r#"
You are a software engineer defining a new feature from an analysis of customer issues. Proceed as follows:

1. **Understand the analysis**: read the customer issue analysis given as the user's input. Identify the key requirements, the user pain points and the functionality that has to be addressed.

2. **Write a task definition** for the new feature. It must include:
   - A clear purpose for the feature.
   - The input parameters the function will need (user input, configuration settings, ...).
   - The expected output of the function (success confirmation, error messages, ...).
   - The validation rules or conditions that must hold before the function runs.
   - The error scenarios to account for (invalid input, system errors, ...).

3. **Write the Python function**: implement the feature as a Python 3.11 function that
   - accepts the parameters from the task definition,
   - validates its inputs,
   - handles each error scenario with an appropriate message or response,
   - returns a success message or the relevant output when it completes.

Wrap the final Python function in <function> tags and keep it clear and maintainable.

The conversation so far:
{{ history }}

The user's follow-up: {{ input }}

Your response:
"#;

/// Conversation template used by the gated wizard; each stage supplies its own instruction.
pub const WIZARD_TEMPLATE: &str = r#"
You are a senior software engineer helping a product team turn customer feedback into working code.
Answer in Markdown. When you write code, use Python 3.11 and wrap the final function in <function> tags.

The conversation so far:
{{ history }}

The user's follow-up: {{ input }}

Your response:
"#;

pub const SAMPLE_ANALYSIS: &str = "Analysis of the \u{201c}Frequency of Issues\u{201d} chart reveals that password reset requests \
overwhelmingly dominate support inquiries, occurring 42 times\u{2014}far more than any other issue. This \
disproportionate volume highlights a clear opportunity to enhance user account management and bolster \
self-service password recovery options, which could both streamline the user experience and alleviate the \
burden on your support team.";

/// Instruction for the task definition stage. The analysis text is copied in.
pub fn user_story_instruction(analysis: &str) -> String {
    format!(
        "Based on the following analysis of customer issues, write a user story for the most \
        important feature to build, followed by a task definition covering its purpose, input \
        parameters, expected output, validation rules and error handling scenarios.\n\n\
        Analysis:\n{analysis}"
    )
}

/// Wrapper for the code generation stage. The task definition text is copied in.
pub fn code_generation_instruction(task_definition: &str) -> String {
    format!(
        "Write a Python 3.11 function that implements the following user story and task \
        definition. Include input validation and error handling, and wrap the final function in \
        <function> tags.\n\n\
        Task definition:\n{task_definition}"
    )
}
