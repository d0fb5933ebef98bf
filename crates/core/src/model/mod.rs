mod ids;
mod progress;
mod survey;
mod token;

pub use ids::{DEFAULT_FORM_ID, FormId, FormIdError, MAX_FORM_ID_LEN, ParseIdError, QuestionId};
pub use progress::{
    LastVisited, PageDescriptor, ProgressState, VisitEntry, VisitMetadata,
    module_number_from_path, normalize_page_path,
};
pub use survey::{
    AnswerError, AnswerSet, AnswerValue, DEFAULT_MODULE, DEFAULT_PARENT_MODULE, Question,
    ResponseGroups, ResponseView, SurveyResponse,
};
pub use token::{
    SessionCredential, Token, TokenFormatError, TokenRecord, TokenRecordError, TokenStatus,
};
