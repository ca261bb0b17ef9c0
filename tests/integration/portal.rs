//! In-memory stand-in for the procurement portal
//!
//! Renders the landing page, list grid and detail forms as static HTML and
//! answers [`Driver`] calls by parsing that HTML with scraper. Element tokens
//! are document-order indices into the current rendering of a frame; clicks
//! are routed through `data-action` attributes.

use async_trait::async_trait;
use nuri_harvest::browser::{
    ClickMode, Driver, DriverError, DriverResult, ElementHandle, FrameHandle, FramePath,
};
use scraper::{ElementRef, Html, Selector};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// How a list row renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Data,
    /// Carries the grid's hidden-row class
    SystemRow,
    /// Has the `hidden` attribute
    Hidden,
    /// Only three cells
    Narrow,
    /// Identifier cell left empty
    BlankId,
    /// Opens a detail page without an announcement number
    NoDetailId,
    /// No anchor; the row itself opens the detail page
    NoAnchor,
}

#[derive(Debug, Clone)]
pub struct Announcement {
    pub bid_no: String,
    pub title: String,
    pub kind: RowKind,
}

impl Announcement {
    pub fn data(bid_no: &str) -> Self {
        Self::with_kind(bid_no, RowKind::Data)
    }

    pub fn with_kind(bid_no: &str, kind: RowKind) -> Self {
        Self {
            bid_no: bid_no.to_string(),
            title: format!("{} 청사 청소 용역", bid_no),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum View {
    Blank,
    Landing,
    List,
    Detail(String),
}

#[derive(Debug, Default, Clone)]
pub struct Faults {
    pub menu_missing: bool,
    pub list_button_broken: bool,
    pub history_back_broken: bool,
    pub pager_hidden: bool,
    /// The menu stays reachable while a detail page is shown
    pub menu_on_detail: bool,
    /// An overlay swallows normal clicks on row links
    pub links_blocked: bool,
    /// Search clicks fail once this many searches went through
    pub search_limit: Option<usize>,
    /// Every navigation after the first one fails
    pub reentry_broken: bool,
}

/// Persisted state seen at the moment a detail page was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenSnapshot {
    pub snapshot_records: usize,
    pub visited_ids: usize,
}

#[derive(Debug)]
struct State {
    view: View,
    page: usize,
    searched: bool,
    popup_open: bool,
    opened: Vec<String>,
    openings: Vec<OpenSnapshot>,
    navigations: usize,
    script_clicks: usize,
    searches: usize,
}

#[derive(Debug)]
pub struct Portal {
    pages: Vec<Vec<Announcement>>,
    faults: Faults,
    watched_paths: Option<(PathBuf, PathBuf)>,
    state: Mutex<State>,
}

const TOP_URL: &str = "https://portal.test/";

impl Portal {
    pub fn new(pages: Vec<Vec<Announcement>>) -> Self {
        Self {
            pages,
            faults: Faults::default(),
            watched_paths: None,
            state: Mutex::new(State {
                view: View::Blank,
                page: 1,
                searched: false,
                popup_open: false,
                opened: Vec::new(),
                openings: Vec::new(),
                navigations: 0,
                script_clicks: 0,
                searches: 0,
            }),
        }
    }

    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }

    /// Reads the snapshot and visited files every time a row is opened
    pub fn watching_state(mut self, snapshot: PathBuf, visited: PathBuf) -> Self {
        self.watched_paths = Some((snapshot, visited));
        self
    }

    pub fn opened(&self) -> Vec<String> {
        self.state.lock().unwrap().opened.clone()
    }

    pub fn openings(&self) -> Vec<OpenSnapshot> {
        self.state.lock().unwrap().openings.clone()
    }

    pub fn navigations(&self) -> usize {
        self.state.lock().unwrap().navigations
    }

    pub fn script_clicks(&self) -> usize {
        self.state.lock().unwrap().script_clicks
    }

    pub fn current_page(&self) -> usize {
        self.state.lock().unwrap().page
    }

    fn announcement(&self, bid_no: &str) -> Option<&Announcement> {
        self.pages.iter().flatten().find(|a| a.bid_no == bid_no)
    }

    fn render_top(&self, state: &State) -> String {
        let mut html = String::from("<html><body>");
        if state.popup_open {
            html.push_str(
                "<div class=\"popup\"><a class=\"popup-close\" data-action=\"close-popup\">닫기</a></div>",
            );
        }
        if !self.faults.menu_missing && state.view != View::Blank {
            let style = if matches!(state.view, View::Detail(_)) && !self.faults.menu_on_detail {
                " style=\"display: none\""
            } else {
                ""
            };
            html.push_str(&format!(
                "<a class=\"menu\" data-action=\"menu\"{}>입찰공고목록</a>",
                style
            ));
        }
        html.push_str("<iframe name=\"content\"></iframe></body></html>");
        html
    }

    fn render_list(&self, state: &State) -> String {
        let mut html = String::from("<html><body><div class=\"title\">입찰공고목록</div>");
        html.push_str("<input type=\"button\" id=\"btnSearch\" value=\"검색\" data-action=\"search\">");
        html.push_str("<div class=\"w2grid\"><table><thead><tr><th>번호</th><th>입찰공고번호</th>");
        html.push_str("<th>공고명</th><th>수요기관</th><th>게시일시</th></tr></thead><tbody>");

        if state.searched {
            if let Some(rows) = self.pages.get(state.page - 1) {
                for (n, row) in rows.iter().enumerate() {
                    html.push_str(&render_row(n + 1, row));
                }
            }
        }
        html.push_str("</tbody></table></div>");

        let style = if self.faults.pager_hidden {
            " style=\"display:none\""
        } else {
            ""
        };
        html.push_str(&format!("<div class=\"w2pageList\"{}>", style));
        for n in 1..=self.pages.len() {
            if n == state.page {
                html.push_str(&format!("<strong>{}</strong>", n));
            } else {
                html.push_str(&format!(
                    "<a id=\"pg_{n}\" index=\"{n}\" data-action=\"page:{n}\">{n}</a>"
                ));
            }
        }
        html.push_str("</div></body></html>");
        html
    }

    fn render_detail(&self, bid_no: &str) -> String {
        let Some(announcement) = self.announcement(bid_no) else {
            return "<html><body><p>오류</p></body></html>".to_string();
        };
        let mut html = String::from("<html><body><div class=\"detail\">");
        if announcement.kind != RowKind::NoDetailId {
            html.push_str(&format!(
                "<label class=\"w2textbox\">입찰공고번호</label><span class=\"w2textbox\">{}</span>",
                announcement.bid_no
            ));
        }
        html.push_str(&format!(
            "<label class=\"w2textbox\">공고명</label><span class=\"w2textbox\">{}</span>",
            announcement.title
        ));
        html.push_str("<label class=\"w2textbox\">수요기관</label><span class=\"w2textbox\">조달청</span>");
        html.push_str("<h3 class=\"tit\">참가업체</h3>");
        html.push_str("<div class=\"w2grid\"><table><thead><tr><th>업체</th><th>금액</th></tr></thead>");
        html.push_str("<tbody><tr><td>가나건설</td><td>1,000</td></tr></tbody></table></div>");
        html.push_str("<input type=\"button\" class=\"btn_list\" value=\"목록\" data-action=\"list\">");
        html.push_str("</div></body></html>");
        html
    }

    fn frame_html(&self, state: &State, frame: &FramePath) -> DriverResult<String> {
        match frame.indices() {
            [] => Ok(self.render_top(state)),
            [0] => match &state.view {
                View::Blank => Err(DriverError::Detached(frame.to_string())),
                View::Landing => Ok("<html><body><p>환영합니다</p></body></html>".to_string()),
                View::List => Ok(self.render_list(state)),
                View::Detail(bid_no) => Ok(self.render_detail(bid_no)),
            },
            _ => Err(DriverError::Detached(frame.to_string())),
        }
    }

    fn frame_address(state: &State) -> Option<String> {
        match &state.view {
            View::Blank => None,
            View::Landing => Some("https://portal.test/main/welcome".to_string()),
            View::List => Some(format!(
                "https://portal.test/BidPbancL/list?page={}",
                state.page
            )),
            View::Detail(bid_no) => Some(format!(
                "https://portal.test/BidPbancL/detail?bid={}",
                bid_no
            )),
        }
    }

    /// Parses the frame's current HTML and hands it to `f`
    fn with_doc<T>(
        &self,
        frame: &FramePath,
        f: impl FnOnce(&Html) -> DriverResult<T>,
    ) -> DriverResult<T> {
        let html = {
            let state = self.state.lock().unwrap();
            self.frame_html(&state, frame)?
        };
        let document = Html::parse_document(&html);
        f(&document)
    }

    fn with_element<T>(
        &self,
        element: &ElementHandle,
        f: impl FnOnce(ElementRef<'_>, &[ElementRef<'_>]) -> DriverResult<T>,
    ) -> DriverResult<T> {
        self.with_doc(&element.frame, |document| {
            let all = elements(document);
            let found = all
                .get(element.token as usize)
                .copied()
                .ok_or_else(|| DriverError::NotFound(format!("token {}", element.token)))?;
            f(found, &all)
        })
    }

    fn perform(&self, action: &str) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        match action {
            "close-popup" => state.popup_open = false,
            "menu" => {
                // the menu opens a fresh, unsearched list
                state.view = View::List;
                state.page = 1;
                state.searched = false;
            }
            "search" => {
                if self.faults.search_limit.is_some_and(|limit| state.searches >= limit) {
                    return Err(DriverError::NotInteractable("search button".to_string()));
                }
                state.searches += 1;
                state.searched = true;
            }
            "list" => {
                if !self.faults.list_button_broken {
                    state.view = View::List;
                }
            }
            _ => {
                if let Some(bid_no) = action.strip_prefix("open:") {
                    let opening = self.read_persisted();
                    if let Some(opening) = opening {
                        state.openings.push(opening);
                    }
                    state.opened.push(bid_no.to_string());
                    state.view = View::Detail(bid_no.to_string());
                } else if let Some(page) = action.strip_prefix("page:") {
                    state.page = page
                        .parse()
                        .map_err(|_| DriverError::Script(format!("bad page '{}'", page)))?;
                    state.searched = true;
                } else {
                    return Err(DriverError::Script(format!("unknown action '{}'", action)));
                }
            }
        }
        Ok(())
    }

    fn read_persisted(&self) -> Option<OpenSnapshot> {
        let (snapshot, visited) = self.watched_paths.as_ref()?;
        let snapshot_records = std::fs::read_to_string(snapshot)
            .ok()
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
            .and_then(|value| value.as_array().map(Vec::len))
            .unwrap_or(0);
        let visited_ids = std::fs::read_to_string(visited)
            .ok()
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
            .and_then(|value| value["visited_ids"].as_array().map(Vec::len))
            .unwrap_or(0);
        Some(OpenSnapshot {
            snapshot_records,
            visited_ids,
        })
    }
}

fn render_row(number: usize, row: &Announcement) -> String {
    let anchor = format!(
        "<a data-action=\"open:{0}\">{0}</a>",
        row.bid_no
    );
    let cells = |id_cell: &str| {
        format!(
            "<td>{}</td><td>{}</td><td>{}</td><td>조달청</td><td>2024-01-0{}</td>",
            number,
            id_cell,
            row.title,
            number % 9 + 1
        )
    };
    match row.kind {
        RowKind::Data | RowKind::NoDetailId => {
            format!("<tr class=\"gridBodyDefault\">{}</tr>", cells(&anchor))
        }
        RowKind::SystemRow => format!(
            "<tr class=\"gridBodyDefault w2grid_hidedRow\">{}</tr>",
            cells(&anchor)
        ),
        RowKind::Hidden => format!("<tr class=\"gridBodyDefault\" hidden>{}</tr>", cells(&anchor)),
        RowKind::Narrow => format!(
            "<tr class=\"gridBodyDefault\"><td>{}</td><td>{}</td><td>{}</td></tr>",
            number, anchor, row.title
        ),
        RowKind::BlankId => format!("<tr class=\"gridBodyDefault\">{}</tr>", cells("")),
        RowKind::NoAnchor => format!(
            "<tr class=\"gridBodyDefault\" data-action=\"open:{}\">{}</tr>",
            row.bid_no,
            cells(&row.bid_no)
        ),
    }
}

fn elements(document: &Html) -> Vec<ElementRef<'_>> {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .collect()
}

fn token_of(all: &[ElementRef<'_>], element: &ElementRef<'_>) -> Option<u64> {
    all.iter()
        .position(|e| e.id() == element.id())
        .map(|index| index as u64)
}

fn parse_selector(selector: &str) -> DriverResult<Selector> {
    Selector::parse(selector).map_err(|_| DriverError::Script(format!("bad selector '{}'", selector)))
}

fn shown(element: &ElementRef<'_>) -> bool {
    let own = std::iter::once(*element);
    let ancestors = element.ancestors().filter_map(ElementRef::wrap);
    own.chain(ancestors).all(|e| {
        let style: String = e
            .value()
            .attr("style")
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        e.value().attr("hidden").is_none() && !style.contains("display:none")
    })
}

fn action_of(element: &ElementRef<'_>) -> Option<String> {
    std::iter::once(*element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .find_map(|e| e.value().attr("data-action").map(str::to_string))
}

/// JSON string literal following `marker` in `script`
fn literal_after(script: &str, marker: &str, end: char) -> Option<String> {
    let start = script.find(marker)? + marker.len();
    let rest = &script[start..];
    let stop = rest.find(end)?;
    serde_json::from_str(&rest[..stop]).ok()
}

#[async_trait]
impl Driver for Portal {
    async fn navigate(&self, _url: &str, _timeout: Duration) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.navigations += 1;
        if self.faults.reentry_broken && state.navigations > 1 {
            return Err(DriverError::Navigation("portal unreachable".to_string()));
        }
        state.view = View::Landing;
        state.page = 1;
        state.searched = false;
        state.popup_open = true;
        Ok(())
    }

    async fn frames(&self) -> DriverResult<Vec<FrameHandle>> {
        let state = self.state.lock().unwrap();
        Ok(Self::frame_address(&state)
            .map(|url| {
                vec![FrameHandle {
                    path: FramePath::top().child(0),
                    name: "content".to_string(),
                    url,
                }]
            })
            .unwrap_or_default())
    }

    async fn query_all(&self, frame: &FramePath, selector: &str) -> DriverResult<Vec<ElementHandle>> {
        let selector = parse_selector(selector)?;
        self.with_doc(frame, |document| {
            let all = elements(document);
            Ok(document
                .select(&selector)
                .filter_map(|e| token_of(&all, &e))
                .map(|token| ElementHandle::new(frame.clone(), token))
                .collect())
        })
    }

    async fn query_within(
        &self,
        element: &ElementHandle,
        selector: &str,
    ) -> DriverResult<Vec<ElementHandle>> {
        let selector = parse_selector(selector)?;
        self.with_element(element, |found, all| {
            Ok(found
                .select(&selector)
                .filter_map(|e| token_of(all, &e))
                .map(|token| ElementHandle::new(element.frame.clone(), token))
                .collect())
        })
    }

    async fn is_visible(&self, element: &ElementHandle) -> DriverResult<bool> {
        self.with_element(element, |found, _| Ok(shown(&found)))
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        self.with_element(element, |found, _| {
            Ok(found.value().attr(name).map(str::to_string))
        })
    }

    async fn inner_text(&self, element: &ElementHandle) -> DriverResult<String> {
        self.with_element(element, |found, _| Ok(found.text().collect::<Vec<_>>().join(" ")))
    }

    async fn text_content(&self, frame: &FramePath) -> DriverResult<String> {
        self.with_doc(frame, |document| {
            Ok(document.root_element().text().collect::<Vec<_>>().join(" "))
        })
    }

    async fn click(&self, element: &ElementHandle, mode: ClickMode) -> DriverResult<()> {
        let action = self.with_element(element, |found, _| {
            if mode == ClickMode::Normal && !shown(&found) {
                return Err(DriverError::NotInteractable(format!("token {}", element.token)));
            }
            Ok(action_of(&found))
        })?;
        match action {
            Some(action) if mode == ClickMode::Normal && self.faults.links_blocked && action.starts_with("open:") => {
                Err(DriverError::NotInteractable("row link covered".to_string()))
            }
            Some(action) => self.perform(&action),
            None => Ok(()),
        }
    }

    async fn hover(&self, _element: &ElementHandle) -> DriverResult<()> {
        Ok(())
    }

    async fn scroll_into_view(&self, _element: &ElementHandle) -> DriverResult<()> {
        Ok(())
    }

    async fn press_key(&self, _key: &str) -> DriverResult<()> {
        Ok(())
    }

    async fn evaluate(&self, frame: &FramePath, script: &str) -> DriverResult<serde_json::Value> {
        let action = if let Some(id) = literal_after(script, "getElementById(", ')') {
            let selector = parse_selector(&format!("[id='{}']", id))?;
            self.with_doc(frame, |document| {
                Ok(document.select(&selector).next().and_then(|e| action_of(&e)))
            })?
        } else if let Some(want) = literal_after(script, "const want = ", ';') {
            let selector = parse_selector("a, li, div")?;
            self.with_doc(frame, |document| {
                Ok(document
                    .select(&selector)
                    .filter(|e| shown(e))
                    .find(|e| e.text().collect::<String>().trim() == want)
                    .and_then(|e| action_of(&e)))
            })?
        } else {
            return Err(DriverError::Script("unsupported script".to_string()));
        };

        match action {
            Some(action) => {
                self.perform(&action)?;
                self.state.lock().unwrap().script_clicks += 1;
                Ok(serde_json::Value::Bool(true))
            }
            None => Ok(serde_json::Value::Bool(false)),
        }
    }

    async fn go_back(&self) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        if matches!(state.view, View::Detail(_)) && !self.faults.history_back_broken {
            state.view = View::List;
        }
        Ok(())
    }

    async fn wait_for_network_idle(&self, _timeout: Duration) -> DriverResult<()> {
        Ok(())
    }

    async fn content(&self, frame: &FramePath) -> DriverResult<String> {
        let state = self.state.lock().unwrap();
        self.frame_html(&state, frame)
    }

    async fn frame_url(&self, frame: &FramePath) -> DriverResult<String> {
        let state = self.state.lock().unwrap();
        if frame.is_top() {
            return Ok(TOP_URL.to_string());
        }
        match (frame.indices(), Self::frame_address(&state)) {
            ([0], Some(url)) => Ok(url),
            _ => Err(DriverError::Detached(frame.to_string())),
        }
    }
}
