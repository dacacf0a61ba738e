// Prompts for the tailoring service.

use crate::tailoring::models::Colors;

pub const DOCUMENTS_SYSTEM: &str = "\
    You are an expert resume and cover letter strategist specialising in ATS \
    optimisation and job alignment. Rewrite the candidate's resume for the job \
    description and write a matching cover letter.

    Resume rules:
    - Preserve every original section, experience, skill, link and contact detail. Never remove content.
    - Weave the job's keywords, required skills and technologies into the existing experience.
    - Prefer achievement-oriented bullet points with concrete results where the resume supports them.
    - Render the resume as a complete HTML document using the selected template and colour palette.

    Cover letter rules:
    - 3-4 paragraphs, roughly 250-400 words, professional and human in tone.
    - Connect the candidate's background to the employer's stated needs and close with a call to action.
    - Render it as a complete HTML document in the same visual style as the resume.

    Return a JSON object with exactly two string keys: \
    \"generated_resume\" and \"generated_cover_letter\".";

pub const JOB_DETAILS_SYSTEM: &str = "\
    You are a concise title generator and company name extractor. For the job \
    posting you are given, return a JSON object with these keys:
    - \"title\": 1-4 words (max 40 characters) naming the role and company
    - \"company_name\": the hiring organisation
    - \"source_site\": the job board the posting came from, or an empty string if unknown
    Example: {\"title\":\"Data Scientist Acme Corp\",\"company_name\":\"Acme Corp\",\"source_site\":\"\"}";

/// Builds the user message for the documents call.
pub fn build_documents_message(
    job_posting: &str,
    resume_text: &str,
    template_html: &str,
    colors: &Colors,
) -> String {
    format!(
        "<analysis_request>\n\
         <job_description>\n{job}\n</job_description>\n\n\
         <current_resume>\n{resume}\n</current_resume>\n\n\
         <selected_template>\n{template}\n</selected_template>\n\n\
         <color_palette>\n\
         primary: {primary}\nsecondary: {secondary}\naccent: {accent}\ntext: {text}\n\
         </color_palette>\n\n\
         <task>\nOptimize this resume for the job description above. Follow all \
         guidelines in your system instructions, ensuring ATS compatibility and \
         keyword optimization.\n</task>\n\
         </analysis_request>",
        job = job_posting.trim(),
        resume = resume_text.trim(),
        template = template_html.trim(),
        primary = colors.primary,
        secondary = colors.secondary,
        accent = colors.accent,
        text = colors.text,
    )
}
