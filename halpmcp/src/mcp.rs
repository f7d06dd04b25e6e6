use crate::errors::Error;
use crate::relay::Cluster;
use crate::relay::Relay;

use log;
use rmcp::ServerHandler;
use rmcp::ServiceExt;
use rmcp::model::CallToolRequestParam;
use rmcp::model::CallToolResult;
use rmcp::model::Content;
use rmcp::model::ErrorData as McpError;
use rmcp::model::GetPromptRequestParam;
use rmcp::model::GetPromptResult;
use rmcp::model::Implementation;
use rmcp::model::ListPromptsResult;
use rmcp::model::ListToolsResult;
use rmcp::model::PaginatedRequestParam;
use rmcp::model::Prompt;
use rmcp::model::PromptArgument;
use rmcp::model::PromptMessage;
use rmcp::model::PromptMessageRole;
use rmcp::model::ServerCapabilities;
use rmcp::model::ServerInfo;
use rmcp::model::Tool;
use rmcp::service::RequestContext;
use rmcp::service::RoleServer;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

pub const SERVER_NAME: &str = "halp-mcp";
pub const SERVER_VERSION: &str = "v0.0.1";

pub const TOOL_NAME: &str = "halp";
pub const TOOL_DESCRIPTION: &str = "send halp message";
pub const PROMPT_NAME: &str = "halp";
pub const PROMPT_DESCRIPTION: &str = "Halp message prompt";
const MESSAGE_DESCRIPTION: &str = "the halp message to send";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct HalpArgs {
    /// the halp message to send
    pub message: String,
}

pub fn confirmation(message: &str) -> String {
    format!("Message {} has been spent, godspeed.", message)
}

pub fn prompt_text(message: &str) -> String {
    format!("Send an SOS message with content {}", message)
}

/*
 * HalpServer exposes the relay as the `halp` MCP tool, plus a `halp`
 * prompt. Session handling and the wire format belong to rmcp.
 */
pub struct HalpServer<C> {
    relay: Relay<C>,
}

impl<C: Cluster + 'static> HalpServer<C> {

    pub fn new(relay: Relay<C>) -> Self {
	Self{
	    relay: relay,
	}
    }

    pub fn tool(&self) -> Result<Tool, McpError> {
	let schema = match serde_json::to_value(schemars::schema_for!(HalpArgs)) {
	    Ok(Value::Object(schema)) => schema,
	    Ok(other) => return Err(McpError::internal_error(format!("unexpected input schema: {}", other), None)),
	    Err(err) => return Err(McpError::internal_error(err.to_string(), None)),
	};

	Ok(Tool::new(TOOL_NAME, TOOL_DESCRIPTION, schema))
    }

    /*
     * A failing relay is reported as a tool error; only a request that does
     * not name the halp tool or lacks a proper message is refused.
     */
    pub async fn call(&self, request: CallToolRequestParam) -> Result<CallToolResult, McpError> {
	if request.name != TOOL_NAME {
	    return Err(McpError::invalid_params(format!("Unknown tool: {}", request.name), None));
	}

	let arguments = Value::Object(request.arguments.unwrap_or_default());
	let args: HalpArgs = serde_json::from_value(arguments)
	    .map_err(|err| McpError::invalid_params(format!("Invalid arguments: {}", err), None))?;

	match self.relay.send(&args.message).await {
	    Ok(_) => Ok(CallToolResult::success(vec![Content::text(confirmation(&args.message))])),
	    Err(err) => {
		log::error!("Unable to relay message through namespace {}: {}", self.relay.namespace(), err);
		Ok(CallToolResult::error(vec![
		    Content::text(format!("Message {} could not be sent: {}", args.message, err)),
		]))
	    }
	}
    }

    pub fn prompt(&self) -> Result<Prompt, McpError> {
	let message: PromptArgument = serde_json::from_value(json!({
	    "name": "message",
	    "description": MESSAGE_DESCRIPTION,
	    "required": true,
	})).map_err(|err| McpError::internal_error(err.to_string(), None))?;

	Ok(Prompt::new(PROMPT_NAME, Some(PROMPT_DESCRIPTION), Some(vec![message])))
    }

    pub fn render_prompt(&self, request: GetPromptRequestParam) -> Result<GetPromptResult, McpError> {
	if request.name != PROMPT_NAME {
	    return Err(McpError::invalid_params(format!("Unknown prompt: {}", request.name), None));
	}

	// not validated, a missing message just renders empty
	let message = request.arguments.as_ref()
	    .and_then(|args| args.get("message"))
	    .and_then(Value::as_str)
	    .unwrap_or_default();

	Ok(GetPromptResult{
	    description: Some(PROMPT_DESCRIPTION.to_string()),
	    messages: vec![PromptMessage::new_text(PromptMessageRole::User, prompt_text(message))],
	})
    }

    /*
     * Serve one MCP session over `transport` until the client goes away or
     * the token is cancelled.
     */
    pub async fn run<R, W>(self, transport: (R, W), token: CancellationToken) -> Result<(), Error>
    where
	R: AsyncRead + Send + Unpin + 'static,
	W: AsyncWrite + Send + Unpin + 'static,
    {
	log::info!("{} {} listening on stdio", SERVER_NAME, SERVER_VERSION);

	let service = self.serve_with_ct(transport, token).await
	    .map_err(|err| Error::Mcp(err.to_string()))?;
	let reason = service.waiting().await
	    .map_err(|err| Error::Mcp(err.to_string()))?;

	log::info!("Stopping {}: {:?}", SERVER_NAME, reason);
	Ok(())
    }
}

impl<C: Cluster + 'static> ServerHandler for HalpServer<C> {

    fn get_info(&self) -> ServerInfo {
	ServerInfo{
	    capabilities: ServerCapabilities::builder()
		.enable_tools()
		.enable_prompts()
		.build(),
	    server_info: Implementation{
		name: SERVER_NAME.to_string(),
		version: SERVER_VERSION.to_string(),
		..Default::default()
	    },
	    ..Default::default()
	}
    }

    async fn list_tools(&self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>) -> Result<ListToolsResult, McpError> {
	Ok(ListToolsResult::with_all_items(vec![self.tool()?]))
    }

    async fn call_tool(&self, request: CallToolRequestParam, _context: RequestContext<RoleServer>) -> Result<CallToolResult, McpError> {
	log::debug!("tools/call {} {:?}", request.name, request.arguments);
	self.call(request).await
    }

    async fn list_prompts(&self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>) -> Result<ListPromptsResult, McpError> {
	Ok(ListPromptsResult::with_all_items(vec![self.prompt()?]))
    }

    async fn get_prompt(&self, request: GetPromptRequestParam, _context: RequestContext<RoleServer>) -> Result<GetPromptResult, McpError> {
	log::debug!("prompts/get {} {:?}", request.name, request.arguments);
	self.render_prompt(request)
    }
}
