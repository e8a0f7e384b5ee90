// Structured Analysis prompt templates.
// All prompts for the analysis module are defined here. Tenant templates stored
// in `prompt_templates` replace DEFAULT_ANALYSIS_* but use the same placeholder.

pub const DEFAULT_ANALYSIS_SYSTEM: &str = "\
You are a precise resume data extractor. \
Read the resume text and return its content as structured JSON. \
You MUST respond with valid JSON only, no markdown fences, no explanations. \
Never invent employers, dates, degrees or skills that are not in the text.";

pub const DEFAULT_ANALYSIS_TEMPLATE: &str = r#"Extract the following resume into a JSON object.

RESUME TEXT:
{resume_text}

OUTPUT SCHEMA (return exactly this structure):
{
  "personal_info": {
    "full_name": "string" | null,
    "email": "string" | null,
    "phone": "string" | null,
    "location": "string" | null
  },
  "summary": "string" | null,
  "work_experience": [
    {
      "title": "string",
      "company": "string",
      "duration": "string, as written (e.g. 'Jan 2019 - Present')",
      "description": "string" | null,
      "responsibilities": ["string"],
      "achievements": ["string"],
      "technologies": ["string"]
    }
  ],
  "education": [
    {
      "degree": "string (e.g. 'MSc')",
      "field_of_study": "string (e.g. 'Artificial Intelligence')",
      "institution": "string",
      "year": "string" | null
    }
  ],
  "certifications": ["string"],
  "skills": [
    {
      "name": "string",
      "level": "expert" | "advanced" | "intermediate" | "beginner",
      "years": number | null,
      "evidence": "short quote from the resume" | null
    }
  ],
  "languages": ["string (e.g. 'English (Native)')"],
  "total_experience_years": number | null
}

Rules:
- Use empty arrays when a section is absent. Do not omit keys.
- One entry per distinct role; list the most recent role first.
- Skill level reflects how the resume evidences the skill, not how common it is."#;

/// Second attempt after an unparseable response. No schema hints, so the
/// model cannot echo schema comments back.
pub const STRICT_RETRY_PROMPT: &str = r#"Return ONLY a JSON object describing this resume: the person's contact details, a summary, their jobs, their education, their certifications, their skills with a level for each, and the languages they speak.

Start your reply with { and end it with }. No other text.

RESUME TEXT:
{resume_text}"#;

/// Narrow follow-up when the main response is missing work history or education.
pub const SECTIONS_PROMPT: &str = r#"From the resume below, extract ONLY the work history and education.

RESUME TEXT:
{resume_text}

Return exactly:
{
  "work_experience": [
    {"title": "string", "company": "string", "duration": "string", "description": "string" | null}
  ],
  "education": [
    {"degree": "string", "field_of_study": "string", "institution": "string", "year": "string" | null}
  ]
}
Use empty arrays when the resume has no such section."#;
