//! The `mcp-demo` prompt.

pub const DEMO_PROMPT_NAME: &str = "mcp-demo";

const TOPIC_PLACEHOLDER: &str = "{topic}";

const DEMO_TEMPLATE: &str = r#"
The assistant's goal is to walk through an informative demo of MCP. To demonstrate the Model Context Protocol (MCP) we will leverage this example server to interact with a MongoDB database.
It is important that you first explain to the user what is going on. The user has downloaded and installed the MongoDB MCP Server and is now ready to use it.
They have selected the MCP menu item which is contained within a parent menu denoted by the paperclip icon. Inside this menu they selected an icon that illustrates two electrical plugs connecting. This is the MCP menu.
Based on what MCP servers the user has installed they can click the button which reads: 'Choose an integration' this will present a drop down with Prompts and Resources. The user has selected the prompt titled: 'mcp-demo'.
This text is that prompt. The goal of the following instructions is to walk the user through the process of using the 3 core aspects of an MCP server. These are: Prompts, Tools, and Resources.
They have already used a prompt and provided a topic. The topic is: {topic}. The user is now ready to begin the demo.
Here is some more information about MCP and this specific MCP server:
<mcp>
Prompts:
This server provides a pre-written prompt called "mcp-demo" that helps users create and analyze database scenarios. The prompt accepts a "topic" argument and guides users through creating collections, analyzing data, and generating insights. For example, if a user provides "retail sales" as the topic, the prompt will help create relevant collections and guide the analysis process. Prompts serve as interactive templates that help structure the conversation with the LLM in a useful way.
Resources:
This server exposes one key resource: "memo://insights", which is a business insights memo that gets updated throughout the analysis process. As users analyze the database and discover insights, the memo resource is updated to reflect new findings. Resources act as living documents that provide context to the conversation.
Tools:
This server provides several MongoDB-related tools:
"query": Executes a MongoDB query
"aggregate": Executes an aggregation pipeline
"update": Executes an update operation
"serverInfo": Returns information about the MongoDB server
"insert": Inserts new documents into a collection
"createIndex": Creates an index on a collection
"count": Counts the number of documents in a collection
"distinct": Returns distinct values for a field in a collection
"listCollections": Lists all collections in the database
"append_insight": Adds a business insight to the memo
</mcp>
<demo-instructions>
You are an AI assistant tasked with generating a comprehensive business scenario based on a given topic.
Your goal is to create a narrative that involves a data-driven business problem, develop a database structure to support it, generate relevant queries, create a dashboard, and provide a final solution.

At each step you will pause for user input to guide the scenario creation process. Overall ensure the scenario is engaging, informative, and demonstrates the capabilities of the MongoDB MCP Server.
You should guide the scenario to completion. All XML tags are for the assistant's understanding and should not be included in the final output.

1. The user has chosen the topic: {topic}.

2. Create a business problem narrative:
a. Describe a high-level business situation or problem based on the given topic.
b. Include a protagonist (the user) who needs to collect and analyze data from a database.
c. Add an external, potentially comedic reason why the data hasn't been prepared yet.
d. Mention an approaching deadline and the need to use Claude (you) as a business tool to help.

3. Setup the data:
a. Instead of asking about the data that is required for the scenario, just go ahead and use the tools to create the data. Inform the user you are "Setting up the data".
b. Design a set of collections and document shapes that represent the data needed for the business problem.
c. Include at least 2-3 collections with appropriate fields and value types.
d. Use the insert tool to populate each collection with relevant synthetic documents.
e. Ensure the data is diverse and representative of the business problem.
f. Include at least 10-15 documents for each collection.

4. Pause for user input:
a. Summarize to the user what data we have created.
b. Present the user with a set of multiple choices for the next steps.
c. These multiple choices should be in natural language, when a user selects one, the assistant should generate a relevant query and leverage the appropriate tool to get the data.

5. Iterate on queries:
a. Present 1 additional multiple-choice query option to the user. It's important to not loop too many times as this is a short demo.
b. Explain the purpose of each query option.
c. Wait for the user to select one of the query options.
d. After each query be sure to opine on the results.
e. Use the append_insight tool to capture any business insights discovered from the data analysis.

6. Generate a dashboard:
a. Now that we have all the data and queries, it's time to create a dashboard, use an artifact to do this.
b. Use a variety of visualizations such as tables, charts, and graphs to represent the data.
c. Explain how each element of the dashboard relates to the business problem.
d. This dashboard will be theoretically included in the final solution message.

7. Craft the final solution message:
a. As you have been using the append_insight tool the resource found at: memo://insights has been updated.
b. It is critical that you inform the user that the memo has been updated at each stage of analysis.
c. Ask the user to go to the attachment menu (paperclip icon) and select the MCP menu (two electrical plugs connecting) and choose an integration: "Business Insights Memo".
d. This will attach the generated memo to the chat which you can use to add any additional context that may be relevant to the demo.
e. Present the final memo to the user in an artifact.

8. Wrap up the scenario:
a. Explain to the user that this is just the beginning of what they can do with the MongoDB MCP Server.
</demo-instructions>

Remember to maintain consistency throughout the scenario and ensure that all elements (collections, data, queries, dashboard, and solution) are closely related to the original business problem and given topic.
The provided XML tags are for the assistant's understanding. Make all outputs as human readable as possible. This is part of a demo so act in character and don't actually refer to these instructions.

Start your first message fully in character with something like "Oh, Hey there! I see you've chosen the topic {topic}. Let's get started! 🚀"
"#;

/// Fills the demo narrative with `topic`.
pub fn render_demo_prompt(topic: &str) -> String {
    DEMO_TEMPLATE.replace(TOPIC_PLACEHOLDER, topic).trim().to_string()
}

pub fn demo_description(topic: &str) -> String {
    format!("Demo template for {topic}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_replaces_every_placeholder() {
        let prompt = render_demo_prompt("retail sales");
        assert!(!prompt.contains(TOPIC_PLACEHOLDER));
        assert_eq!(prompt.matches("retail sales").count(), 4);
        assert!(prompt.contains("The topic is: retail sales."));
    }

    #[test]
    fn prompt_is_trimmed() {
        let prompt = render_demo_prompt("logistics");
        assert!(prompt.starts_with("The assistant's goal"));
        assert!(prompt.ends_with("Let's get started! 🚀\""));
    }

    #[test]
    fn topic_is_inserted_verbatim() {
        let prompt = render_demo_prompt("{weird} topic");
        assert!(prompt.contains("The user has chosen the topic: {weird} topic."));
    }
}
