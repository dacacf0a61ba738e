// Prompts for listing enrichment.

pub const LISTING_DETAILS_SYSTEM: &str = "\
    Extract key information from the job description you are given and return \
    a JSON object with these keys:
    - \"jobTitle\": the exact title of the position
    - \"organization\": full name of the hiring organisation
    - \"grade\": job grade or level
    - \"reportingTo\": the direct supervisor's role
    - \"responsibleFor\": subordinate roles, as an array of strings
    - \"department\": department or section name
    - \"purpose\": a one or two sentence summary of the job's purpose
    - \"keyResponsibilities\": array of the main responsibilities
    - \"requiredQualifications\": array of required qualifications
    - \"requiredExperience\": years and type of experience needed
    - \"requiredMemberships\": professional memberships required, as an array of strings
    - \"contactDetails\": how to submit an application
    - \"additionalNotes\": special notes about the application process
    - \"tags\": array of short tags such as \"internship\", \"remote\" or \"health\"
    - \"industry\": the primary industry, for example \"Information & Communications Technology (ICT)\", \
    \"Healthcare & Life Sciences\", \"Construction & Engineering\" or \"Finance & Accounting\"
    - \"domain\": the specialism within that industry, for example \"Cybersecurity\" or \"Audit\"

    Use \"N/A\" for any field the description does not mention.";
