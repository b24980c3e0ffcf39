use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sheetguard")]
#[command(version)]
#[command(about = "Safety gate for spreadsheet mutations", long_about = None)]
pub struct Cli {
    /// 시트 스냅샷 JSON 파일
    #[arg(short = 's', long)]
    pub sheet: PathBuf,

    /// 작업 요청 JSON 파일 (배열이면 일괄 평가)
    #[arg(short = 'r', long)]
    pub request: PathBuf,

    /// 설정 파일 (미지정시 ~/.sheetguard/config.toml, 없으면 기본값)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// 사용자 확인 완료로 평가 (confirmed = true)
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// 결과를 JSON으로 출력
    #[arg(long)]
    pub json: bool,

    /// 감사 기록(JSON 한 줄)도 출력
    #[arg(long)]
    pub audit: bool,

    /// 디버그 로그 (stderr)
    #[arg(short = 'd', long)]
    pub debug: bool,
}
