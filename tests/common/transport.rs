use cors_guard::constants::method;
use cors_guard::{
    Channel, ChannelRef, HeaderList, NetError, RedirectFlags, RedirectObserver, Status,
    StreamListener,
};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use url::Url;

/// In-memory HTTP request. Responses and redirects are driven by the test.
pub struct MockChannel {
    this: Weak<MockChannel>,
    uri: Url,
    original: Url,
    method: String,
    request_headers: RefCell<HeaderList>,
    anonymous: Cell<bool>,
    response_status: Cell<Option<u16>>,
    response_headers: RefCell<HeaderList>,
    status: RefCell<Status>,
    listener: RefCell<Option<Box<dyn StreamListener>>>,
    observer: RefCell<Option<Rc<dyn RedirectObserver>>>,
    opened: Cell<bool>,
    preflights: RefCell<Vec<Rc<MockChannel>>>,
}

impl MockChannel {
    pub fn new(method: &str, uri: &str) -> Rc<Self> {
        let uri = Url::parse(uri).expect("valid test URL");
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            original: uri.clone(),
            uri,
            method: method.to_owned(),
            request_headers: RefCell::new(HeaderList::new()),
            anonymous: Cell::new(false),
            response_status: Cell::new(None),
            response_headers: RefCell::new(HeaderList::new()),
            status: RefCell::new(Ok(())),
            listener: RefCell::new(None),
            observer: RefCell::new(None),
            opened: Cell::new(false),
            preflights: RefCell::new(Vec::new()),
        })
    }

    pub fn get(uri: &str) -> Rc<Self> {
        Self::new(method::GET, uri)
    }

    pub fn as_channel(self: &Rc<Self>) -> ChannelRef {
        Rc::clone(self) as ChannelRef
    }

    pub fn is_opened(&self) -> bool {
        self.opened.get()
    }

    /// `OPTIONS` requests spawned from this one, in creation order.
    pub fn preflights(&self) -> Vec<Rc<MockChannel>> {
        self.preflights.borrow().clone()
    }

    pub fn request_headers(&self) -> HeaderList {
        self.request_headers.borrow().clone()
    }

    fn set_response(&self, status: u16, headers: &[(&str, &str)]) {
        self.response_status.set(Some(status));
        let mut list = self.response_headers.borrow_mut();
        for (name, value) in headers {
            list.set(*name, *value);
        }
    }

    /// Delivers a full response to whoever opened the channel.
    pub fn respond(&self, status: u16, headers: &[(&str, &str)], body: &[u8]) {
        self.set_response(status, headers);
        let Some(mut listener) = self.listener.borrow_mut().take() else {
            panic!("{} responded before being opened", self.uri);
        };
        let channel = self.upgrade();

        listener.on_start_request(&channel);
        if self.status().is_ok()
            && !body.is_empty()
            && let Err(err) = listener.on_data_available(&channel, body)
        {
            self.cancel(err);
        }
        listener.on_stop_request(&channel, self.status());
    }

    /// Answers with a redirect to `target` and asks the installed observer to
    /// approve it. On approval the listener moves over to the new channel.
    pub fn redirect(
        &self,
        status: u16,
        headers: &[(&str, &str)],
        target: &str,
        flags: RedirectFlags,
    ) -> (Rc<MockChannel>, Rc<RefCell<Option<Status>>>) {
        self.set_response(status, headers);
        let old = self.upgrade_mock();
        let new = MockChannel::new(&self.method, target);
        *new.observer.borrow_mut() = self.observer.borrow().clone();

        let outcome = Rc::new(RefCell::new(None));
        let observer = self
            .observer
            .borrow()
            .clone()
            .expect("redirect observer installed");

        let callback = {
            let old = Rc::clone(&old);
            let new = Rc::clone(&new);
            let outcome = Rc::clone(&outcome);
            Box::new(move |result: Status| {
                if result.is_ok() {
                    let listener = old.listener.borrow_mut().take();
                    *new.listener.borrow_mut() = listener;
                    new.opened.set(true);
                }
                *outcome.borrow_mut() = Some(result);
            })
        };
        observer.on_redirect(&old.as_channel(), &new.as_channel(), flags, callback);

        (new, outcome)
    }

    fn upgrade_mock(&self) -> Rc<MockChannel> {
        self.this.upgrade().expect("channel alive")
    }

    fn upgrade(&self) -> ChannelRef {
        self.upgrade_mock()
    }
}

impl Channel for MockChannel {
    fn uri(&self) -> Url {
        self.uri.clone()
    }

    fn original_uri(&self) -> Url {
        self.original.clone()
    }

    fn method(&self) -> String {
        self.method.clone()
    }

    fn is_http(&self) -> bool {
        matches!(self.uri.scheme(), "http" | "https")
    }

    fn set_request_header(&self, name: &str, value: &str) {
        self.request_headers.borrow_mut().set(name, value);
    }

    fn request_header(&self, name: &str) -> Option<String> {
        self.request_headers.borrow().get(name).map(str::to_owned)
    }

    fn set_anonymous(&self) {
        self.anonymous.set(true);
    }

    fn is_anonymous(&self) -> bool {
        self.anonymous.get()
    }

    fn response_header(&self, name: &str) -> Option<String> {
        self.response_headers.borrow().get(name).map(str::to_owned)
    }

    fn response_status(&self) -> Option<u16> {
        self.response_status.get()
    }

    fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    fn cancel(&self, error: NetError) {
        let mut status = self.status.borrow_mut();
        if status.is_ok() {
            *status = Err(error);
        }
    }

    fn open(&self, listener: Box<dyn StreamListener>) -> Status {
        if self.opened.replace(true) {
            return Err(NetError::Transport("channel already opened".into()));
        }
        self.status()?;
        *self.listener.borrow_mut() = Some(listener);
        Ok(())
    }

    fn redirect_observer(&self) -> Option<Rc<dyn RedirectObserver>> {
        self.observer.borrow().clone()
    }

    fn set_redirect_observer(&self, observer: Option<Rc<dyn RedirectObserver>>) {
        *self.observer.borrow_mut() = observer;
    }

    fn new_preflight(&self) -> Result<ChannelRef, NetError> {
        let preflight = MockChannel::new(method::OPTIONS, self.uri.as_str());
        self.preflights.borrow_mut().push(Rc::clone(&preflight));
        Ok(preflight as ChannelRef)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start(String),
    Data(Vec<u8>),
    Stop(Status),
}

/// Listener that remembers every notification it receives.
#[derive(Clone, Default)]
pub struct RecordingListener {
    events: Rc<RefCell<Vec<Event>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn body(&self) -> Vec<u8> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Data(data) => Some(data.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn boxed(&self) -> Box<dyn StreamListener> {
        Box::new(self.clone())
    }
}

impl StreamListener for RecordingListener {
    fn on_start_request(&mut self, channel: &ChannelRef) {
        self.events
            .borrow_mut()
            .push(Event::Start(channel.uri().to_string()));
    }

    fn on_data_available(&mut self, _channel: &ChannelRef, data: &[u8]) -> Status {
        self.events.borrow_mut().push(Event::Data(data.to_vec()));
        Ok(())
    }

    fn on_stop_request(&mut self, _channel: &ChannelRef, status: Status) {
        self.events.borrow_mut().push(Event::Stop(status));
    }
}

/// Outer redirect observer that answers only when the test says so.
#[derive(Default)]
pub struct DeferringObserver {
    pending: RefCell<Option<cors_guard::RedirectCallback>>,
    seen: Cell<usize>,
}

impl DeferringObserver {
    pub fn seen(&self) -> usize {
        self.seen.get()
    }

    pub fn resume(&self, result: Status) {
        let callback = self
            .pending
            .borrow_mut()
            .take()
            .expect("redirect awaiting verification");
        callback(result);
    }
}

impl RedirectObserver for DeferringObserver {
    fn on_redirect(
        &self,
        _old: &ChannelRef,
        _new: &ChannelRef,
        _flags: RedirectFlags,
        callback: cors_guard::RedirectCallback,
    ) {
        self.seen.set(self.seen.get() + 1);
        *self.pending.borrow_mut() = Some(callback);
    }
}
