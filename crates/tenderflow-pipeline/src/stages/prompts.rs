use tenderflow_core::types::{QueryAnalysis, QueryContext};

pub(crate) const ANALYSIS_SYSTEM: &str = "You are an expert system specialized in analyzing \
queries for a tender document knowledge graph. Your task is to analyze queries and provide \
structured output that strictly follows the specified JSON format.";

pub(crate) const ENHANCEMENT_SYSTEM: &str = "You are an expert in enhancing queries for tender \
document retrieval. Transform the analyzed query into a more comprehensive search specification.";

pub(crate) const CYPHER_SYSTEM: &str = "You are an expert in Neo4j and Cypher query optimization. \
Reply with a single read-only Cypher query and nothing else.";

const ANALYSIS_FORMAT: &str = r#"{
  "query_intent": "string",
  "key_concepts": ["string"],
  "temporal_aspects": {"valid_from": "YYYY-MM-DD or null", "valid_to": "YYYY-MM-DD or null", "is_current": true},
  "document_scope": ["string"],
  "relationship_patterns": ["string"],
  "compliance_checks": ["string"]
}"#;

pub(crate) fn analysis_prompt(query: &str) -> String {
    format!(
        "ANALYSIS REQUIREMENTS:\n\
         1. Query Intent: {query}\n\
         2. Key Concepts: Extract main entities and concepts\n\
         3. Temporal Aspects: Identify time-related constraints\n\
         4. Document Scope: Specify relevant document types\n\
         5. Relationship Patterns: Define document connections\n\
         6. Compliance Checks: List compliance requirements\n\n\
         Format Instructions:\n\
         Return one JSON object of this shape:\n{shape}\n\n\
         Return the analysis in the exact format specified.",
        shape = ANALYSIS_FORMAT,
    )
}

pub(crate) fn enhancement_prompt(query: &str, analysis: &QueryAnalysis) -> String {
    let analysis_json =
        serde_json::to_string_pretty(analysis).unwrap_or_else(|_| format!("{:?}", analysis));
    format!(
        "Original query: {query}\n\
         Analysis results: {analysis_json}\n\n\
         Enhance this query by:\n\
         1. Adding relevant contextual parameters\n\
         2. Specifying document type constraints\n\
         3. Including temporal considerations\n\
         4. Adding relationship patterns\n\n\
         Return the enhanced query specification."
    )
}

pub(crate) fn cypher_prompt(enhanced_query: &str, context: &QueryContext) -> String {
    format!(
        "Generate an optimized Cypher query for: {enhanced_query}\n\n\
         Requirements:\n\
         1. Read only: use MATCH or CALL and RETURN, never write clauses\n\
         2. Filter document types with the $document_types parameter\n\
         3. Keep only nodes scoring at least $threshold\n\
         4. Limit output with LIMIT $max_results\n\
         5. Return columns id, properties, score, metadata and relationships, \
         where relationships is a list of {{type, end_node, properties}} maps\n\n\
         Document types: {:?}\n\
         Relevance threshold: {}\n\
         Maximum results: {}",
        context.search_scope(),
        context.relevance_threshold(),
        context.max_results(),
    )
}
