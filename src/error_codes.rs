//! 에러 코드 상수 정의
//!
//! 프론트엔드에서 i18n 처리를 위해 에러 코드를 문자열로 반환합니다.

/// 파일 또는 카테고리를 찾을 수 없음
pub const ERR_NOT_FOUND: &str = "ERR_NOT_FOUND";

/// 삭제된 카테고리로 이동 시도
pub const ERR_TARGET_DELETED: &str = "ERR_TARGET_DELETED";

/// 같은 이름이 이미 존재함
pub const ERR_CONFLICT: &str = "ERR_CONFLICT";

/// 서버가 요청을 거부함
pub const ERR_INVALID_REQUEST: &str = "ERR_INVALID_REQUEST";

/// 네트워크 또는 서버 오류
pub const ERR_SERVER: &str = "ERR_SERVER";

/// 입력값 검증 실패
pub const ERR_INVALID_INPUT: &str = "ERR_INVALID_INPUT";

/// 지원하지 않는 위치에서의 작업
pub const ERR_UNSUPPORTED: &str = "ERR_UNSUPPORTED";

/// 파일이 지정한 위치에 없음
pub const ERR_NOT_IN_LOCATION: &str = "ERR_NOT_IN_LOCATION";

/// 서버에 다운로드 폴더가 없음
pub const ERR_UNSORTED_FOLDER_MISSING: &str = "ERR_UNSORTED_FOLDER_MISSING";
